use std::path::Path;

use anyhow::bail;
use indoc::indoc;

use crate::Config;

pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;

    validate(&config)?;

    Ok(config)
}

pub(crate) fn validate(config: &Config) -> anyhow::Result<()> {
    if let Some(endpoint) = config.upstream.endpoint.as_deref()
        && !endpoint.starts_with("http://")
        && !endpoint.starts_with("https://")
    {
        bail!(indoc! {r#"
            The upstream endpoint override must be an absolute HTTP(S) URL.

            Example configuration:

              [upstream]
              endpoint = "https://api.githubcopilot.com"
        "#});
    }

    if config.upstream.integration_id.is_empty()
        || config.upstream.editor_version.is_empty()
        || config.upstream.editor_plugin_version.is_empty()
    {
        bail!(indoc! {r#"
            Upstream identification headers must not be empty. Remove the keys to
            use the defaults, or provide non-empty values:

              [upstream]
              integration_id = "vscode-chat"
              editor_version = "vscode/1.95.0"
              editor_plugin_version = "copilot-chat/0.22.4"
        "#});
    }

    if config.model.default_id.is_empty() {
        bail!("The default model identifier must not be empty.");
    }

    Ok(())
}
