use indicatif::ProgressBar;
use once_cell::sync::Lazy;
use std::sync::{Arc, Mutex};

pub mod api;
pub mod chain;
pub mod config;
pub mod generator;
pub mod init;
pub mod reference;
pub mod resolution;
pub mod runner;
pub mod scene;
pub mod wait;

/// Receives every operator line (`[TAG] message`) in addition to stderr.
pub type OperatorLogHook = Arc<Mutex<dyn Fn(&str) + Send + Sync + 'static>>;

static LOG_HOOK: Lazy<Mutex<Option<OperatorLogHook>>> = Lazy::new(|| Mutex::new(None));

static ACTIVE_BAR: Lazy<Mutex<Option<ProgressBar>>> = Lazy::new(|| Mutex::new(None));

pub fn set_log_hook(hook: Option<OperatorLogHook>) {
    if let Ok(mut guard) = LOG_HOOK.lock() {
        *guard = hook;
    }
}

/// While alive, operator lines are printed above `bar` rather than into it.
pub(crate) struct BarScope;

impl BarScope {
    pub(crate) fn enter(bar: &ProgressBar) -> Self {
        set_active_bar(Some(bar.clone()));
        BarScope
    }
}

impl Drop for BarScope {
    fn drop(&mut self) {
        set_active_bar(None);
    }
}

fn set_active_bar(bar: Option<ProgressBar>) {
    if let Ok(mut guard) = ACTIVE_BAR.lock() {
        *guard = bar;
    }
}

fn print_line(line: &str) {
    let bar = ACTIVE_BAR.lock().ok().and_then(|guard| guard.clone());
    match bar {
        Some(bar) => bar.suspend(|| eprintln!("{}", line)),
        None => eprintln!("{}", line),
    }
}

/// Blank separator line; not forwarded to the hook.
pub(crate) fn logblank() {
    print_line("");
}

pub(crate) fn logv(tag: &str, message: &str) {
    let line = format!("[{}] {}", tag, message);
    print_line(&line);

    if let Ok(guard) = LOG_HOOK.lock() {
        if let Some(hook) = guard.as_ref() {
            if let Ok(callback) = hook.lock() {
                callback(&line);
            }
        }
    }
}

pub(crate) fn logi(message: impl AsRef<str>) {
    logv("INFO", message.as_ref());
}

pub(crate) fn logok(message: impl AsRef<str>) {
    logv("OK", message.as_ref());
}

pub(crate) fn logw(message: impl AsRef<str>) {
    logv("WARN", message.as_ref());
}
