// SPDX-License-Identifier: GPL-3.0-only

//! caretpanel
//!
//! Serves the kimpanel panel interfaces on the session bus, places the
//! candidate panel under the caret and shows the current input method in
//! the tray.

use caretpanel::{app, config::PanelConfig, i18n};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("caretpanel=info".parse().unwrap()),
        )
        .init();

    // Get the system's preferred languages.
    let requested_languages = i18n_embed::DesktopLanguageRequester::requested_languages();

    // Enable localizations to be applied.
    i18n::init(&requested_languages);

    let config = PanelConfig::load();
    tracing::debug!("Configuration: {:?}", config);

    app::run(config).await;
}
