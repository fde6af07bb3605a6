use comif_frame::encode_frame;

use crate::cmd::EncodeArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_encoded, OutputFormat};

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let payload = args.payload.resolve()?;
    let frame = encode_frame(&payload);
    print_encoded(&payload, &frame, format);
    Ok(SUCCESS)
}
