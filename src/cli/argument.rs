use clap::builder::styling::AnsiColor;
use clap::builder::{PossibleValue, Styles};
use clap::{ArgAction, Parser};
use wayfare::{Method, RequestParams, SettingsPatch, UserAgentMode};

fn get_styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Yellow.on_default())
        .usage(AnsiColor::Green.on_default())
        .literal(AnsiColor::BrightGreen.on_default())
        .placeholder(AnsiColor::Cyan.on_default())
}

/// Fetch urls through a shared, caching HTTP browser.
#[derive(Parser, Debug, Clone)]
#[command(version, styles = get_styles())]
pub struct Cli {
    /// Urls to fetch, concurrently up to --max-threads.
    #[arg(required = true, num_args(1..))]
    pub urls: Vec<String>,

    /// JSON config file read instead of the default one.
    #[arg(short, long)]
    pub config_file: Option<std::path::PathBuf>,

    /// Directory holding the cookie jar.
    #[arg(long)]
    pub cache_dir: Option<std::path::PathBuf>,

    /// HTTP method to use.
    #[arg(
        short = 'X',
        long,
        default_value = "get",
        value_parser([
            PossibleValue::new("get"),
            PossibleValue::new("post"),
            PossibleValue::new("head"),
        ])
    )]
    pub method: String,

    /// Request body, sent with --method post.
    #[arg(short, long)]
    pub data: Option<String>,

    /// Extra request header as `Name: value`, repeat for more.
    #[arg(short = 'H', long = "header", action = ArgAction::Append, value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Follow redirects.
    #[arg(short = 'L', long)]
    pub follow: bool,

    /// Output format for the results.
    #[arg(
        short,
        long,
        default_value = "default",
        value_parser([
            PossibleValue::new("default"),
            PossibleValue::new("json"),
        ])
    )]
    pub format: String,

    /// Log level for application output.
    #[arg(
        long = "log",
        default_value = "off",
        value_parser([
            PossibleValue::new("debug"),
            PossibleValue::new("info"),
            PossibleValue::new("warn"),
            PossibleValue::new("error"),
            PossibleValue::new("trace"),
            PossibleValue::new("off"),
        ])
    )]
    pub log_level: String,

    /// Proxy as host:port, optionally prefixed with http:// or socks5://.
    #[arg(long, help_heading = "Settings")]
    pub proxy: Option<String>,

    /// Proxy credentials as user:pass.
    #[arg(long, help_heading = "Settings")]
    pub proxy_auth: Option<String>,

    /// Basic auth credentials as user:pass.
    #[arg(long, help_heading = "Settings")]
    pub basic_auth: Option<String>,

    #[arg(long, help_heading = "Settings")]
    pub user_agent: Option<String>,

    /// How the user agent is chosen for each request.
    #[arg(
        long,
        help_heading = "Settings",
        value_parser([
            PossibleValue::new("static"),
            PossibleValue::new("semi-static"),
            PossibleValue::new("random"),
        ])
    )]
    pub user_agent_mode: Option<String>,

    /// Seconds a response stays cached, 0 disables the cache.
    #[arg(long, help_heading = "Settings")]
    pub cache_ttl: Option<u64>,

    /// Request timeout in milliseconds, 0 for none.
    #[arg(long, help_heading = "Settings")]
    pub timeout: Option<u64>,

    /// Connect timeout in milliseconds, 0 for none.
    #[arg(long, help_heading = "Settings")]
    pub connect_timeout: Option<u64>,

    /// Maximum number of concurrent requests.
    #[arg(long, help_heading = "Settings", value_parser = clap::value_parser!(u64).range(1..))]
    pub max_threads: Option<u64>,
}

/// Splits a `Name: value` header argument.
fn parse_header(header: &str) -> Result<(String, String), String> {
    match header.split_once(':') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected `Name: value`, got {:?}", header)),
    }
}

impl Cli {
    /// Settings given on the command line, layered over the config file.
    pub fn settings_patch(&self) -> SettingsPatch {
        let user_agent_mode = self.user_agent_mode.as_deref().map(|mode| match mode {
            "semi-static" => UserAgentMode::SemiStatic,
            "random" => UserAgentMode::Random,
            _ => UserAgentMode::Static,
        });

        SettingsPatch {
            user_agent: self.user_agent.clone(),
            user_agent_mode,
            proxy: self.proxy.clone(),
            proxy_auth: self.proxy_auth.clone(),
            basic_auth: self.basic_auth.clone(),
            max_threads: self.max_threads.map(|n| n as usize),
            cache_ttl: self.cache_ttl,
            request_timeout: self.timeout,
            connect_timeout: self.connect_timeout,
            ..Default::default()
        }
    }

    pub fn request_params(&self) -> RequestParams {
        let method = match self.method.as_str() {
            "post" => Method::Post,
            "head" => Method::Head,
            _ => Method::Get,
        };

        let mut params = RequestParams {
            method,
            body: self.data.clone().map(Into::into),
            follow_location: self.follow,
            ..Default::default()
        };
        for (name, value) in &self.headers {
            params.append_header(name, value);
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_takes_one_value() {
        let cli = Cli::try_parse_from([
            "wayfare",
            "-H",
            "Accept: text/html",
            "http://example.localhost",
        ])
        .unwrap();

        assert_eq!(cli.urls, ["http://example.localhost"]);
        assert_eq!(
            cli.headers,
            [("Accept".to_string(), "text/html".to_string())]
        );

        let params = cli.request_params();
        let headers = params.headers.unwrap();
        assert_eq!(headers.get("Accept").map(String::as_str), Some("text/html"));
    }

    #[test]
    fn test_repeated_headers() {
        let cli = Cli::try_parse_from([
            "wayfare",
            "-H",
            "Accept: text/html",
            "--header",
            "X-Trace:1",
            "http://example.localhost",
        ])
        .unwrap();
        assert_eq!(cli.headers.len(), 2);
        assert_eq!(cli.headers[1], ("X-Trace".to_string(), "1".to_string()));
    }

    #[test]
    fn test_header_without_colon_is_rejected() {
        let result = Cli::try_parse_from(["wayfare", "-H", "Accept", "http://example.localhost"]);
        assert!(result.is_err());
    }
}
