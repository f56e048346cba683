// Application configuration, loaded from environment variables and CLI flags.

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Database URL (SQLite connection string).
    pub database_url: String,
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// API key for the commentary completion API. When unset, Tyler answers
    /// with a fixed fallback and no network call is made.
    pub commentary_api_key: Option<String>,
    /// Chat-completion endpoint (OpenAI-compatible).
    pub commentary_api_url: String,
    /// Model name passed to the completion API.
    pub commentary_model: String,
    /// Seconds to wait for the completion API before falling back.
    pub commentary_timeout_secs: u64,
}

impl Config {
    /// Load configuration from environment variables and CLI arguments.
    ///
    /// Environment variables:
    /// - `DATABASE_URL` - SQLite connection string (default: `sqlite:fightclub.db?mode=rwc`)
    /// - `PORT` - HTTP server port (default: 3000)
    /// - `GROQ_API_KEY` - commentary API key (optional)
    /// - `GROQ_API_URL` - completion endpoint override
    /// - `GROQ_MODEL` - model name override
    /// - `TYLER_TIMEOUT_SECS` - commentary timeout (default: 10)
    ///
    /// CLI flags:
    /// - `--port <PORT>` - Override the port
    pub fn load() -> Self {
        let args: Vec<String> = std::env::args().collect();

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite:fightclub.db?mode=rwc".to_string());

        // Port: CLI flag --port takes precedence, then env var, then default
        let port = Self::parse_cli_value(&args, "--port")
            .and_then(|v| v.parse().ok())
            .or_else(|| std::env::var("PORT").ok().and_then(|v| v.parse().ok()))
            .unwrap_or(3000);

        let commentary_api_key = std::env::var("GROQ_API_KEY").ok().filter(|k| !k.is_empty());

        let commentary_api_url = std::env::var("GROQ_API_URL")
            .unwrap_or_else(|_| "https://api.groq.com/openai/v1/chat/completions".to_string());

        let commentary_model =
            std::env::var("GROQ_MODEL").unwrap_or_else(|_| "mixtral-8x7b-32768".to_string());

        let commentary_timeout_secs = std::env::var("TYLER_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);

        Config {
            database_url,
            port,
            commentary_api_key,
            commentary_api_url,
            commentary_model,
            commentary_timeout_secs,
        }
    }

    /// Parse a CLI flag value like `--port 8080`.
    fn parse_cli_value(args: &[String], flag: &str) -> Option<String> {
        args.windows(2).find_map(|pair| {
            if pair[0] == flag {
                Some(pair[1].clone())
            } else {
                None
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cli_value() {
        let args: Vec<String> = ["prog", "--port", "8080"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            Config::parse_cli_value(&args, "--port"),
            Some("8080".to_string())
        );
        assert_eq!(Config::parse_cli_value(&args, "--missing"), None);
    }

    #[test]
    fn test_parse_cli_value_flag_without_value() {
        let args: Vec<String> = ["prog", "--port"].iter().map(|s| s.to_string()).collect();
        assert_eq!(Config::parse_cli_value(&args, "--port"), None);
    }
}
