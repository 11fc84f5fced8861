use std::path::Path;

use tracing_core::{Level, LevelFilter};
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{registry, Layer};

/// If a global tracing subscriber is not already configured, log to stdout and to a file,
/// and add our custom panic hook.
///
/// `log` records are forwarded to the subscriber, so the `log` macros can be used everywhere.
pub fn install_logger<P: AsRef<Path>>(file_path: P) {
    let path = file_path.as_ref();
    let directory = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| "train.log".into());
    if let Err(err) = std::fs::create_dir_all(directory) {
        eprintln!("Unable to create the log directory {}: {err}", directory.display());
        return;
    }
    let writer = tracing_appender::rolling::never(directory, file_name);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(writer)
        .with_filter(LevelFilter::INFO)
        .with_filter(filter_fn(skip_noisy_modules));
    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_filter(LevelFilter::INFO)
        .with_filter(filter_fn(skip_noisy_modules));

    if registry()
        .with(file_layer)
        .with(stdout_layer)
        .try_init()
        .is_ok()
    {
        update_panic_hook(path.display().to_string());
    }
}

fn skip_noisy_modules(metadata: &tracing_core::Metadata<'_>) -> bool {
    if let Some(path) = metadata.module_path() {
        // The wgpu crate is logging too much, so we skip `info` level.
        if path.starts_with("wgpu") && *metadata.level() >= Level::INFO {
            return false;
        }
    }
    true
}

fn update_panic_hook(file_path: String) {
    let hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |info| {
        log::error!("PANIC => {}", info);
        eprintln!(
            "=== PANIC ===\nA fatal error happened, you can check the experiment logs here => \
             '{file_path}'\n============="
        );
        hook(info);
    }));
}
