pub const APP_NAME: &str = "ProFast";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
/// `git describe` output captured at build time, when built from a checkout.
pub const BUILD_TAG: Option<&str> = option_env!("PROFAST_BUILD_TAG");

pub const VERSION_LABEL: &str = match BUILD_TAG {
    Some(tag) => tag,
    None => APP_VERSION,
};

/// Sent with every backend request.
pub fn user_agent() -> String {
    format!("{}/{}", APP_NAME.to_lowercase(), VERSION_LABEL)
}
