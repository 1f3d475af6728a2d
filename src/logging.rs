use crate::error::Result;
use std::path::Path;

/// Install the global logger: stdout plus an optional append-mode file.
///
/// Lines look like `2024-03-12 16:45:23.123 [INFO] crypto_oms::trader::spot: message`.
pub fn init_logging(level: log::LevelFilter, file: Option<&Path>) -> Result<()> {
    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} [{}] {}: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stdout());

    if let Some(path) = file {
        dispatch = dispatch.chain(fern::log_file(path)?);
    }

    dispatch.apply()?;
    Ok(())
}
