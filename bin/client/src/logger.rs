/// Initialize the client logger; `RUST_LOG` still wins over `verbose`
pub fn init(verbose: bool) {
    let default_filter = if verbose { "client=debug,info" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_target(false)
        .init();
}
