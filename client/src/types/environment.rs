//! Environment configuration for different deployment stages

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use aws_config::{retry::RetryConfig, timeout::TimeoutConfig, BehaviorVersion};
use tracing::Level;

/// Club the client is deployed for when `CLUB_ID` is not set
pub const DEFAULT_CLUB_ID: &str = "floeng-olklub";

/// Default lifetime of signed photo and cover URLs (1 hour)
const DEFAULT_SIGNED_URL_EXPIRY_SECS: u64 = 60 * 60;

/// Application environment configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    /// Production environment
    Production,
    /// Staging environment
    Staging,
    /// Development environment (uses `LocalStack` and a local auth server)
    Development {
        /// Optional override for signed URL expiry in seconds
        presign_expiry_override: Option<u64>,
    },
}

impl Environment {
    /// Creates an Environment from the `APP_ENV` environment variable
    ///
    /// # Panics
    ///
    /// Panics if `APP_ENV` contains an invalid value
    #[must_use]
    pub fn from_env() -> Self {
        let env = env::var("APP_ENV")
            .unwrap_or_else(|_| "development".to_string())
            .trim()
            .to_lowercase();

        match env.as_str() {
            "production" => Self::Production,
            "staging" => Self::Staging,
            "development" => {
                let presign_expiry_override = env::var("PRESIGNED_URL_EXPIRY_SECS")
                    .ok()
                    .and_then(|val| val.parse::<u64>().ok());

                Self::Development {
                    presign_expiry_override,
                }
            }
            _ => panic!("Invalid environment: {env}"),
        }
    }

    /// Fixed club identifier partitioning rows and blob keys
    #[must_use]
    pub fn club_id(&self) -> String {
        env::var("CLUB_ID")
            .ok()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| DEFAULT_CLUB_ID.to_string())
    }

    /// Returns the S3 bucket name for photos and covers
    ///
    /// # Panics
    ///
    /// Panics if the `S3_BUCKET_NAME` environment variable is not set outside development
    #[must_use]
    pub fn s3_bucket(&self) -> String {
        match self {
            Self::Production | Self::Staging => {
                env::var("S3_BUCKET_NAME").expect("S3_BUCKET_NAME environment variable is not set")
            }
            Self::Development { .. } => {
                env::var("S3_BUCKET_NAME").unwrap_or_else(|_| "beer-club-photos".to_string())
            }
        }
    }

    /// Returns the `DynamoDB` table holding beers
    ///
    /// # Panics
    ///
    /// Panics if the `BEERS_TABLE_NAME` environment variable is not set outside development
    #[must_use]
    pub fn beers_table_name(&self) -> String {
        match self {
            Self::Production | Self::Staging => env::var("BEERS_TABLE_NAME")
                .expect("BEERS_TABLE_NAME environment variable is not set"),
            Self::Development { .. } => {
                env::var("BEERS_TABLE_NAME").unwrap_or_else(|_| "beers".to_string())
            }
        }
    }

    /// Returns the GSI keyed by (`club_id`, `created_at`)
    #[must_use]
    pub fn beers_club_index_name(&self) -> String {
        env::var("BEERS_CLUB_INDEX_NAME").unwrap_or_else(|_| "club-created-index".to_string())
    }

    /// Returns the base URL of the auth server
    ///
    /// # Panics
    ///
    /// Panics if the `AUTH_URL` environment variable is not set outside development
    #[must_use]
    pub fn auth_url(&self) -> String {
        let url = match self {
            Self::Production | Self::Staging => {
                env::var("AUTH_URL").expect("AUTH_URL environment variable is not set")
            }
            Self::Development { .. } => {
                env::var("AUTH_URL").unwrap_or_else(|_| "http://localhost:9999".to_string())
            }
        };

        url.trim_end_matches('/').to_string()
    }

    /// Public API key sent to the auth server
    #[must_use]
    pub fn auth_api_key(&self) -> String {
        env::var("AUTH_API_KEY").unwrap_or_default()
    }

    /// File the session is cached in between runs
    #[must_use]
    pub fn session_file(&self) -> PathBuf {
        env::var("SESSION_FILE").map_or_else(|_| PathBuf::from(".club-session.json"), PathBuf::from)
    }

    /// Returns the endpoint URL to use for AWS services
    #[must_use]
    pub const fn override_aws_endpoint_url(&self) -> Option<&str> {
        match self {
            // Regular AWS endpoints for production and staging
            Self::Production | Self::Staging => None,
            // LocalStack endpoint for development
            Self::Development { .. } => Some("http://localhost:4566"),
        }
    }

    /// AWS configuration with retry and timeout settings
    pub async fn aws_config(&self) -> aws_config::SdkConfig {
        let retry_config = RetryConfig::standard()
            .with_max_attempts(3)
            .with_initial_backoff(Duration::from_millis(50));

        let timeout_config = TimeoutConfig::builder()
            .operation_timeout(Duration::from_secs(30))
            .build();

        let mut config_builder = aws_config::load_defaults(BehaviorVersion::latest())
            .await
            .to_builder()
            .retry_config(retry_config)
            .timeout_config(timeout_config);

        if let Some(endpoint_url) = self.override_aws_endpoint_url() {
            config_builder = config_builder.endpoint_url(endpoint_url);
        }

        config_builder.build()
    }

    /// AWS S3 service configuration
    pub async fn s3_client_config(&self) -> aws_sdk_s3::Config {
        let aws_config = self.aws_config().await;
        let s3_config: aws_sdk_s3::Config = (&aws_config).into();
        let mut builder = s3_config.to_builder();

        // Override "force path style" to true for compatibility with LocalStack
        // https://github.com/awslabs/aws-sdk-rust/discussions/874
        if matches!(self, Self::Development { .. }) {
            builder.set_force_path_style(Some(true));
        }

        builder.build()
    }

    /// AWS `DynamoDB` service configuration
    pub async fn dynamodb_client_config(&self) -> aws_sdk_dynamodb::Config {
        let aws_config = self.aws_config().await;
        (&aws_config).into()
    }

    /// Signed URL expiry time in seconds
    #[must_use]
    pub fn presigned_url_expiry_secs(&self) -> u64 {
        match self {
            Self::Production | Self::Staging => DEFAULT_SIGNED_URL_EXPIRY_SECS,
            Self::Development {
                presign_expiry_override,
            } => presign_expiry_override.unwrap_or(DEFAULT_SIGNED_URL_EXPIRY_SECS),
        }
    }

    /// Base delay between beer list attempts; attempt `n` waits `n` times this
    #[must_use]
    pub fn list_retry_delay(&self) -> Duration {
        let millis = env::var("LIST_RETRY_DELAY_MS")
            .ok()
            .and_then(|val| val.parse::<u64>().ok())
            .unwrap_or(500);

        Duration::from_millis(millis)
    }

    /// Log level used when `RUST_LOG` is not set
    #[must_use]
    pub fn tracing_level(&self) -> Level {
        env::var("TRACING_LEVEL")
            .ok()
            .and_then(|val| val.parse::<Level>().ok())
            .unwrap_or(match self {
                Self::Production | Self::Staging => Level::INFO,
                Self::Development { .. } => Level::DEBUG,
            })
    }
}
