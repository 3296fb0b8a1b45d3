use argument::Cli;
use clap::Parser;
use serde_json::json;
use tokio::runtime;
#[cfg(feature = "log")]
use wayfare::initialize_logging;
use wayfare::{Browser, BrowserOptions, Response};

mod argument;

fn main() {
    if let Err(e) = run_application() {
        eprintln!("Error: {:?}", e);
        std::process::exit(1);
    }
}

/// Colors the status code by class.
#[cfg(feature = "color")]
fn paint_status(status: u16) -> String {
    use colored::Colorize;

    let text = status.to_string();
    match status {
        200..=299 => text.green().to_string(),
        300..=399 => text.yellow().to_string(),
        _ => text.red().to_string(),
    }
}

#[cfg(not(feature = "color"))]
fn paint_status(status: u16) -> String {
    status.to_string()
}

fn render(response: &Response, format: &str, with_body: bool) -> String {
    let body = String::from_utf8_lossy(&response.body);
    match format {
        "json" => json!({
            "url": response.url,
            "status": response.status,
            "headers": response.headers,
            "body": body,
        })
        .to_string(),
        _ => {
            let mut output = format!(
                "<{} {} {} bytes>",
                paint_status(response.status),
                response.url,
                response.body.len()
            );
            if with_body && !body.is_empty() {
                output.push('\n');
                output.push_str(&body);
            }
            output
        }
    }
}

fn run_application() -> anyhow::Result<()> {
    let options = Cli::parse();

    #[cfg(feature = "log")]
    {
        let log_level = match options.log_level.as_str() {
            "debug" => log::LevelFilter::Debug,
            "info" => log::LevelFilter::Info,
            "warn" => log::LevelFilter::Warn,
            "error" => log::LevelFilter::Error,
            "trace" => log::LevelFilter::Trace,
            _ => log::LevelFilter::Off,
        };
        initialize_logging(log_level)?;
    }

    let mut browser_options = BrowserOptions::default().with_settings(options.settings_patch());
    if let Some(config_file) = &options.config_file {
        browser_options = browser_options.with_config_file(config_file);
    }
    if let Some(cache_dir) = &options.cache_dir {
        browser_options = browser_options.with_cache_dir(cache_dir);
    }

    let runtime = runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(async {
        let browser = Browser::instance(browser_options)?;
        let (sender, receiver) = kanal::unbounded_async();

        for (index, url) in options.urls.iter().cloned().enumerate() {
            let browser = browser.clone();
            let sender = sender.clone();
            let params = options.request_params();
            tokio::spawn(async move {
                let result = browser.request(&url, params).await;
                let _ = sender.send((index, url, result)).await;
            });
        }
        drop(sender);

        let mut results = Vec::with_capacity(options.urls.len());
        while let Ok(result) = receiver.recv().await {
            results.push(result);
        }
        results.sort_by_key(|(index, ..)| *index);

        let with_body = options.method != "head";
        let mut failures = 0;
        for (_, url, result) in results {
            match result {
                Ok(response) => println!("{}", render(&response, &options.format, with_body)),
                Err(e) => {
                    failures += 1;
                    eprintln!("{}: {}", url, e);
                }
            }
        }

        if failures > 0 {
            anyhow::bail!("{} of {} requests failed", failures, options.urls.len());
        }
        Ok(())
    })
}
