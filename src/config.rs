use std::env;
use std::str::FromStr;

use chrono_tz::Tz;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub api_token: String,
    /// Timezone used to decide which bookings fall on "today".
    pub viewer_timezone: Tz,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "providerdesk.db".to_string()),
            api_token: env::var("API_TOKEN").unwrap_or_else(|_| "changeme".to_string()),
            viewer_timezone: parse_timezone(
                &env::var("VIEWER_TIMEZONE").unwrap_or_else(|_| "UTC".to_string()),
            ),
        }
    }
}

pub fn parse_timezone(name: &str) -> Tz {
    match Tz::from_str(name.trim()) {
        Ok(tz) => tz,
        Err(_) => {
            tracing::warn!(timezone = name, "unknown VIEWER_TIMEZONE, falling back to UTC");
            Tz::UTC
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_timezone() {
        assert_eq!(parse_timezone("Europe/Berlin"), chrono_tz::Europe::Berlin);
        assert_eq!(parse_timezone(" Asia/Manila "), chrono_tz::Asia::Manila);
    }

    #[test]
    fn test_unknown_timezone_falls_back_to_utc() {
        assert_eq!(parse_timezone("Mars/Olympus_Mons"), Tz::UTC);
        assert_eq!(parse_timezone(""), Tz::UTC);
    }
}
