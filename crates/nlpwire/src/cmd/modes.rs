use nlpwire_worker::MODES;

use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_modes, OutputFormat};

pub fn run(format: OutputFormat) -> CliResult<i32> {
    print_modes(MODES, format);
    Ok(SUCCESS)
}
