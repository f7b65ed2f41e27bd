//! Ref command - print canonical image references

use crate::cli::args::RefArgs;
use crate::error::ControlResult;
use crate::reference::normalize;
use tracing::debug;

/// Execute the ref command; stops at the first malformed reference
pub fn execute(args: RefArgs) -> ControlResult<()> {
    for input in &args.references {
        let canonical = normalize(input)?;
        debug!(input = %input, canonical = %canonical, "normalized reference");
        println!("{}", canonical);
    }
    Ok(())
}
