pub mod app_config;
pub mod command;
pub mod drives;
pub mod host;
pub mod job;
pub mod notifications;
pub mod redacted;
pub mod result_error;
pub mod snapshot;
pub mod stats;
pub mod strategy;
pub mod sync;
pub mod translate;
pub mod validate;
pub mod volume;

#[cfg(test)]
pub(crate) mod test_support;

macro_rules! function_path {
    () => {
        concat!(module_path!(), "::", function_name!(), " ", file!(), ":", line!())
    };
}

pub(crate) use function_path;
