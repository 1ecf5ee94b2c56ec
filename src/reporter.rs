//! Public address reporting.
//!
//! The echo endpoint is polled with a fixed delay between attempts. Each
//! attempt ends in one of three states: an address, a transient failure
//! (keep polling) or a malformed response (stop polling, it will not fix
//! itself). Once polling stops without an address a plain-text lookup
//! command is tried once.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::net::IpAddr;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cmd_abstraction::CommandExecutor;
use crate::config::Config;
use crate::error::TorgateError;

const TIMEOUT_SECS: u64 = 5;
const COUNTRY_URL: &str = "https://ipapi.co";
const COUNTRY_FALLBACK_URL: &str = "http://ip-api.com/json";

/// Result of a single echo request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The endpoint returned a usable address
    Found(String),
    /// Connection or transport failure, worth another try
    Transient(String),
    /// The response could not be understood; further polling is pointless
    Malformed(String),
}

/// Source of the externally visible address
#[async_trait]
pub trait EchoSource: Send + Sync {
    async fn fetch(&self) -> AttemptOutcome;
}

/// Secondary lookup used once polling has given up
pub trait FallbackLookup: Send + Sync {
    fn lookup(&self) -> Option<String>;
}

/// Polling bounds for the echo endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 12,
            delay: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Deserialize)]
struct EchoResponse {
    #[serde(rename = "IP")]
    ip: String,
}

/// Classify an echo response body
pub fn classify_body(body: &str) -> AttemptOutcome {
    match serde_json::from_str::<EchoResponse>(body) {
        Ok(resp) => match resp.ip.trim().parse::<IpAddr>() {
            Ok(addr) => AttemptOutcome::Found(addr.to_string()),
            Err(_) => AttemptOutcome::Malformed(format!("'IP' is not an address: {:?}", resp.ip)),
        },
        Err(e) => AttemptOutcome::Malformed(format!("unexpected response body: {}", e)),
    }
}

/// HTTPS echo endpoint returning `{"IP": "..."}`
pub struct HttpEchoSource {
    client: Client,
    url: String,
}

impl HttpEchoSource {
    pub fn new(url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl EchoSource for HttpEchoSource {
    async fn fetch(&self) -> AttemptOutcome {
        let response = match self.client.get(&self.url).send().await {
            Ok(r) => r,
            Err(e) => return AttemptOutcome::Transient(e.to_string()),
        };

        if !response.status().is_success() {
            return AttemptOutcome::Transient(format!("HTTP {}", response.status()));
        }

        match response.text().await {
            Ok(body) => classify_body(&body),
            Err(e) => AttemptOutcome::Transient(e.to_string()),
        }
    }
}

/// Fallback that runs an external command printing a bare address
pub struct CommandFallback<'a, E: CommandExecutor + ?Sized> {
    executor: &'a E,
    command: Vec<String>,
}

impl<'a, E: CommandExecutor + ?Sized> CommandFallback<'a, E> {
    pub fn new(executor: &'a E, command: &[String]) -> Self {
        Self {
            executor,
            command: command.to_vec(),
        }
    }
}

impl<'a, E: CommandExecutor + ?Sized> FallbackLookup for CommandFallback<'a, E> {
    fn lookup(&self) -> Option<String> {
        let (program, args) = self.command.split_first()?;
        let output = match self.executor.execute(program, args) {
            Ok(o) if o.success => o,
            Ok(o) => {
                debug!("{} failed: {}", program, o.failure_reason());
                return None;
            }
            Err(e) => {
                debug!("{} could not run: {}", program, e);
                return None;
            }
        };

        output
            .stdout
            .trim()
            .parse::<IpAddr>()
            .ok()
            .map(|addr| addr.to_string())
    }
}

/// Reports the host's externally visible address
pub struct AddressReporter<S: EchoSource, F: FallbackLookup> {
    echo: S,
    fallback: F,
    policy: RetryPolicy,
}

impl<S: EchoSource, F: FallbackLookup> AddressReporter<S, F> {
    pub fn new(echo: S, fallback: F, policy: RetryPolicy) -> Self {
        Self {
            echo,
            fallback,
            policy,
        }
    }

    pub fn echo(&self) -> &S {
        &self.echo
    }

    /// Poll the echo endpoint, then fall back once. No address is an error.
    pub async fn report(&self) -> Result<String> {
        if let Some(addr) = self.poll_echo().await {
            return Ok(addr);
        }

        info!("Echo endpoint gave no address, trying fallback lookup");
        match self.fallback.lookup() {
            Some(addr) => Ok(addr),
            None => Err(TorgateError::AddressLookup("can't get public ip address".to_string()).into()),
        }
    }

    async fn poll_echo(&self) -> Option<String> {
        for attempt in 1..=self.policy.attempts {
            match self.echo.fetch().await {
                AttemptOutcome::Found(addr) => {
                    debug!("Echo endpoint answered on attempt {}", attempt);
                    return Some(addr);
                }
                AttemptOutcome::Transient(reason) => {
                    warn!(
                        "Still waiting for IP address (attempt {}/{}): {}",
                        attempt, self.policy.attempts, reason
                    );
                    if attempt < self.policy.attempts {
                        tokio::time::sleep(self.policy.delay).await;
                    }
                }
                AttemptOutcome::Malformed(reason) => {
                    warn!("Echo endpoint returned garbage, not retrying: {}", reason);
                    return None;
                }
            }
        }
        None
    }
}

/// Reporter wired to the configured endpoint and fallback command
pub fn from_config<'a, E: CommandExecutor + ?Sized>(
    config: &Config,
    executor: &'a E,
) -> Result<AddressReporter<HttpEchoSource, CommandFallback<'a, E>>> {
    let echo = HttpEchoSource::new(&config.echo_url)?;
    let fallback = CommandFallback::new(executor, &config.fallback_command);
    let policy = RetryPolicy {
        attempts: config.lookup_attempts,
        delay: config.retry_delay(),
    };
    Ok(AddressReporter::new(echo, fallback, policy))
}

/// Best-effort country name for `ip`; `"Unknown"` when neither service answers
pub async fn lookup_country(client: &Client, ip: &str) -> String {
    let url = format!("{}/{}/country_name/", COUNTRY_URL, ip);
    if let Ok(resp) = client.get(&url).send().await {
        if let Ok(text) = resp.text().await {
            if let Some(country) = parse_country_text(&text) {
                return country;
            }
        }
    }

    let url = format!("{}/{}", COUNTRY_FALLBACK_URL, ip);
    if let Ok(resp) = client.get(&url).send().await {
        if let Ok(text) = resp.text().await {
            if let Some(country) = parse_country_json(&text) {
                return country;
            }
        }
    }

    "Unknown".to_string()
}

fn parse_country_text(text: &str) -> Option<String> {
    let country = text.trim();
    if country.is_empty() || country.to_lowercase().contains("error") {
        return None;
    }
    Some(country.to_string())
}

fn parse_country_json(text: &str) -> Option<String> {
    let json: serde_json::Value = serde_json::from_str(text).ok()?;
    if json.get("status").and_then(|v| v.as_str()) != Some("success") {
        return None;
    }
    json.get("country")
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd_abstraction::{CommandOutput, MockCommandExecutor};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Echo source replaying a fixed script of outcomes
    struct ScriptedEcho {
        script: Mutex<VecDeque<AttemptOutcome>>,
        calls: AtomicUsize,
    }

    impl ScriptedEcho {
        fn new(script: Vec<AttemptOutcome>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EchoSource for ScriptedEcho {
        async fn fetch(&self) -> AttemptOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| AttemptOutcome::Transient("connection refused".to_string()))
        }
    }

    struct StaticFallback {
        answer: Option<String>,
        calls: AtomicUsize,
    }

    impl StaticFallback {
        fn new(answer: Option<&str>) -> Self {
            Self {
                answer: answer.map(str::to_string),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl FallbackLookup for &StaticFallback {
        fn lookup(&self) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer.clone()
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            attempts: 12,
            delay: Duration::ZERO,
        }
    }

    fn transient() -> AttemptOutcome {
        AttemptOutcome::Transient("connection reset".to_string())
    }

    #[tokio::test]
    async fn test_success_after_three_transient_failures() {
        let fallback = StaticFallback::new(Some("198.51.100.1"));
        let reporter = AddressReporter::new(
            ScriptedEcho::new(vec![
                transient(),
                transient(),
                transient(),
                classify_body(r#"{"IsTor": true, "IP": "203.0.113.7"}"#),
            ]),
            &fallback,
            fast_policy(),
        );

        assert_eq!(reporter.report().await.unwrap(), "203.0.113.7");
        assert_eq!(reporter.echo().calls(), 4);
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_malformed_body_skips_to_fallback() {
        let fallback = StaticFallback::new(Some("198.51.100.1"));
        let reporter = AddressReporter::new(
            ScriptedEcho::new(vec![classify_body("<html>blocked</html>")]),
            &fallback,
            fast_policy(),
        );

        assert_eq!(reporter.report().await.unwrap(), "198.51.100.1");
        assert_eq!(reporter.echo().calls(), 1);
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_then_empty_fallback_fails() {
        let fallback = StaticFallback::new(None);
        let reporter = AddressReporter::new(ScriptedEcho::new(vec![]), &fallback, fast_policy());

        let err = reporter.report().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TorgateError>(),
            Some(TorgateError::AddressLookup(_))
        ));
        assert_eq!(reporter.echo().calls(), 12);
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_use_fallback() {
        let fallback = StaticFallback::new(Some("2001:db8::7"));
        let reporter = AddressReporter::new(ScriptedEcho::new(vec![]), &fallback, fast_policy());

        assert_eq!(reporter.report().await.unwrap(), "2001:db8::7");
    }

    #[tokio::test]
    async fn test_retry_delay_is_applied_between_attempts() {
        let fallback = StaticFallback::new(Some("198.51.100.1"));
        let reporter = AddressReporter::new(
            ScriptedEcho::new(vec![]),
            &fallback,
            RetryPolicy {
                attempts: 3,
                delay: Duration::from_millis(30),
            },
        );

        let start = std::time::Instant::now();
        reporter.report().await.unwrap();
        // Two sleeps: none after the final attempt
        assert!(start.elapsed() >= Duration::from_millis(60));
        assert_eq!(reporter.echo().calls(), 3);
    }

    #[tokio::test]
    async fn test_silent_endpoint_times_out_as_transient() {
        // Accepts connections (kernel backlog) but never answers
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/api/ip", listener.local_addr().unwrap());
        let echo = HttpEchoSource::new(&url).unwrap();

        let start = std::time::Instant::now();
        let outcome = echo.fetch().await;
        let elapsed = start.elapsed();

        assert!(matches!(outcome, AttemptOutcome::Transient(_)), "{:?}", outcome);
        assert!(elapsed >= Duration::from_secs(TIMEOUT_SECS - 1));
        assert!(elapsed < Duration::from_secs(TIMEOUT_SECS + 3));
        drop(listener);
    }

    #[test]
    fn test_classify_body() {
        assert_eq!(
            classify_body(r#"{"IP":"203.0.113.7"}"#),
            AttemptOutcome::Found("203.0.113.7".to_string())
        );
        assert!(matches!(classify_body("not json"), AttemptOutcome::Malformed(_)));
        assert!(matches!(classify_body(r#"{"ip":"203.0.113.7"}"#), AttemptOutcome::Malformed(_)));
        assert!(matches!(classify_body(r#"{"IP":42}"#), AttemptOutcome::Malformed(_)));
        assert!(matches!(classify_body(r#"{"IP":"nope"}"#), AttemptOutcome::Malformed(_)));
    }

    #[test]
    fn test_command_fallback_trims_output() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .withf(|cmd, args| cmd == "wget" && args.last().map(String::as_str) == Some("ident.me"))
            .times(1)
            .returning(|_, _| Ok(CommandOutput::ok("203.0.113.9\n")));

        let command = Config::default().fallback_command;
        let fallback = CommandFallback::new(&mock, &command);
        assert_eq!(fallback.lookup(), Some("203.0.113.9".to_string()));
    }

    #[test]
    fn test_command_fallback_empty_output() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .returning(|_, _| Ok(CommandOutput::ok("")));

        let command = Config::default().fallback_command;
        assert_eq!(CommandFallback::new(&mock, &command).lookup(), None);
    }

    #[test]
    fn test_command_fallback_failure() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .returning(|_, _| Ok(CommandOutput::failed(4, "wget: unable to resolve host")));

        let command = Config::default().fallback_command;
        assert_eq!(CommandFallback::new(&mock, &command).lookup(), None);
    }

    #[test]
    fn test_command_fallback_empty_command() {
        let mock = MockCommandExecutor::new();
        assert_eq!(CommandFallback::new(&mock, &[]).lookup(), None);
    }

    #[test]
    fn test_parse_country_text() {
        assert_eq!(parse_country_text("Germany\n"), Some("Germany".to_string()));
        assert_eq!(parse_country_text(""), None);
        assert_eq!(parse_country_text("{\"error\": true}"), None);
    }

    #[test]
    fn test_parse_country_json() {
        assert_eq!(
            parse_country_json(r#"{"status":"success","country":"Netherlands"}"#),
            Some("Netherlands".to_string())
        );
        assert_eq!(
            parse_country_json(r#"{"status":"fail","message":"private range"}"#),
            None
        );
        assert_eq!(parse_country_json("garbage"), None);
    }

    #[test]
    fn test_default_retry_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.attempts, 12);
        assert_eq!(policy.delay, Duration::from_secs(5));
    }
}
