//! Command-line configuration.

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "inkroom-server", version, about = "InkRoom collaboration server")]
pub struct ServerConfig {
    /// Address to bind.
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, short, env = "PORT", default_value_t = 3001)]
    pub port: u16,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::try_parse_from(["inkroom-server"]).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        // PORT may be set in the environment running the tests.
        if std::env::var_os("PORT").is_none() {
            assert_eq!(config.port, 3001);
        }
    }

    #[test]
    fn test_flags() {
        let config =
            ServerConfig::try_parse_from(["inkroom-server", "--host", "127.0.0.1", "--port", "9000"])
                .unwrap();
        assert_eq!(config.bind_addr(), "127.0.0.1:9000");
    }
}
