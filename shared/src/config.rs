//! Configuration management for Lambda functions.

use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// DynamoDB table holding program documents
    pub programs_table: String,
    /// DynamoDB table holding appointment documents
    pub appointments_table: String,
    /// DynamoDB table holding notification documents
    pub notifications_table: String,
    /// DynamoDB table holding FAQ documents
    pub faqs_table: String,
    /// S3 bucket receiving program image uploads; only the uploads
    /// handler requires it
    pub image_bucket: Option<String>,
    /// SNS topic notified after a cancellation commits
    pub events_topic_arn: Option<String>,
    /// Verified SES sender address
    pub from_email: String,
    /// AWS region
    pub aws_region: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, env::VarError> {
        Ok(Self {
            programs_table: env::var("PROGRAMS_TABLE")
                .unwrap_or_else(|_| "programs".to_string()),
            appointments_table: env::var("APPOINTMENTS_TABLE")
                .unwrap_or_else(|_| "appointments".to_string()),
            notifications_table: env::var("NOTIFICATIONS_TABLE")
                .unwrap_or_else(|_| "notifications".to_string()),
            faqs_table: env::var("FAQS_TABLE").unwrap_or_else(|_| "faqs".to_string()),
            image_bucket: env::var("IMAGE_BUCKET").ok(),
            events_topic_arn: env::var("EVENTS_TOPIC_ARN").ok(),
            from_email: env::var("FROM_EMAIL")
                .unwrap_or_else(|_| "noreply@playlocal.app".to_string()),
            aws_region: env::var("AWS_REGION").unwrap_or_else(|_| "ap-southeast-2".to_string()),
        })
    }

    /// Collection-to-table mapping handed to the domain services.
    pub fn collections(&self) -> crate::store::Collections {
        crate::store::Collections {
            programs: self.programs_table.clone(),
            appointments: self.appointments_table.clone(),
            notifications: self.notifications_table.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_image_bucket_does_not_fail_load() {
        env::remove_var("IMAGE_BUCKET");
        let config = Config::from_env().unwrap();
        assert!(config.image_bucket.is_none());
        assert_eq!(config.programs_table, "programs");
    }
}
