//! Environment-driven configuration.
//!
//! Every integration is optional: a missing variable leaves that section
//! `None` and the integration reports as not configured at call time.
//! Parsing is a pure function over a key lookup so tests never touch the
//! process environment.

use std::collections::BTreeMap;
use std::path::PathBuf;

/// Durable store (Firestore) settings.
#[derive(Clone, Debug)]
pub struct FirestoreConfig {
    pub project_id: String,
    pub client_email: String,
    /// PEM private key with literal `\n` sequences already expanded.
    pub private_key: String,
    pub collection: String,
    pub base_url: String,
    pub token_uri: String,
}

/// Google OAuth client settings.
#[derive(Clone, Debug)]
pub struct GoogleOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub auth_url: String,
    pub token_url: String,
    pub scopes: Vec<String>,
}

/// Google API base URLs used by the Gmail and Sheets integrations.
#[derive(Clone, Debug)]
pub struct GoogleApiConfig {
    pub gmail_base_url: String,
    pub sheets_base_url: String,
}

#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

#[derive(Clone, Debug)]
pub struct StripeConfig {
    pub secret_key: String,
    pub base_url: String,
}

/// Meta Graph API settings shared by the Facebook and Instagram commands.
#[derive(Clone, Debug)]
pub struct MetaConfig {
    pub access_token: String,
    pub page_id: Option<String>,
    pub instagram_account_id: Option<String>,
    pub graph_version: String,
    pub base_url: String,
}

#[derive(Clone, Debug)]
pub struct LinkedInConfig {
    pub access_token: String,
    pub author_urn: String,
    pub base_url: String,
}

#[derive(Clone, Debug)]
pub struct HubSpotConfig {
    pub access_token: String,
    pub base_url: String,
}

#[derive(Clone, Debug)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
    pub base_url: String,
}

#[derive(Clone, Debug)]
pub struct SlackConfig {
    pub webhook_url: String,
}

#[derive(Clone, Debug)]
pub struct CalendlyConfig {
    pub token: String,
    pub user_uri: String,
    pub base_url: String,
}

/// Full service configuration.
#[derive(Clone, Debug)]
pub struct ConciergeConfig {
    pub tenant: String,
    pub local_token_path: PathBuf,
    pub firestore: Option<FirestoreConfig>,
    pub google: Option<GoogleOAuthConfig>,
    pub google_api: GoogleApiConfig,
    pub openai: Option<OpenAiConfig>,
    pub stripe: Option<StripeConfig>,
    pub meta: Option<MetaConfig>,
    pub linkedin: Option<LinkedInConfig>,
    pub hubspot: Option<HubSpotConfig>,
    pub twilio: Option<TwilioConfig>,
    pub slack: Option<SlackConfig>,
    pub calendly: Option<CalendlyConfig>,
}

const DEFAULT_GOOGLE_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/gmail.send",
    "https://www.googleapis.com/auth/spreadsheets",
];

impl ConciergeConfig {
    /// Reads configuration from process environment variables.
    ///
    /// | Variable             | Default        |
    /// |----------------------|----------------|
    /// | `TENANT_ID`          | `default`      |
    /// | `LOCAL_TOKEN_PATH`   | `tokens.json`  |
    /// | `FIRESTORE_COLLECTION` | `oauth_tokens` |
    /// | `OPENAI_MODEL`       | `gpt-4o-mini`  |
    /// | `META_GRAPH_VERSION` | `v19.0`        |
    ///
    /// Vendor base URLs default to the public endpoints and can be overridden
    /// with the matching `*_BASE_URL` variable.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from an arbitrary key lookup. Blank values count
    /// as missing.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let firestore = match (
            get("FIREBASE_PROJECT_ID"),
            get("FIREBASE_CLIENT_EMAIL"),
            get("FIREBASE_PRIVATE_KEY"),
        ) {
            (Some(project_id), Some(client_email), Some(private_key)) => Some(FirestoreConfig {
                project_id,
                client_email,
                private_key: private_key.replace("\\n", "\n"),
                collection: or("FIRESTORE_COLLECTION", "oauth_tokens"),
                base_url: or("FIRESTORE_BASE_URL", "https://firestore.googleapis.com"),
                token_uri: or("GOOGLE_TOKEN_URL", "https://oauth2.googleapis.com/token"),
            }),
            _ => None,
        };

        let google = match (
            get("GOOGLE_CLIENT_ID"),
            get("GOOGLE_CLIENT_SECRET"),
            get("GOOGLE_REDIRECT_URI"),
        ) {
            (Some(client_id), Some(client_secret), Some(redirect_uri)) => {
                Some(GoogleOAuthConfig {
                    client_id,
                    client_secret,
                    redirect_uri,
                    auth_url: or("GOOGLE_AUTH_URL", "https://accounts.google.com/o/oauth2/v2/auth"),
                    token_url: or("GOOGLE_TOKEN_URL", "https://oauth2.googleapis.com/token"),
                    scopes: get("GOOGLE_SCOPES")
                        .map(|s| s.split_whitespace().map(str::to_string).collect())
                        .unwrap_or_else(|| {
                            DEFAULT_GOOGLE_SCOPES.iter().map(|s| s.to_string()).collect()
                        }),
                })
            }
            _ => None,
        };

        let meta = get("META_PAGE_ACCESS_TOKEN").map(|access_token| MetaConfig {
            access_token,
            page_id: get("META_PAGE_ID"),
            instagram_account_id: get("INSTAGRAM_ACCOUNT_ID"),
            graph_version: or("META_GRAPH_VERSION", "v19.0"),
            base_url: or("META_BASE_URL", "https://graph.facebook.com"),
        });

        let linkedin = match (get("LINKEDIN_ACCESS_TOKEN"), get("LINKEDIN_AUTHOR_URN")) {
            (Some(access_token), Some(author_urn)) => Some(LinkedInConfig {
                access_token,
                author_urn,
                base_url: or("LINKEDIN_BASE_URL", "https://api.linkedin.com"),
            }),
            _ => None,
        };

        let twilio = match (
            get("TWILIO_ACCOUNT_SID"),
            get("TWILIO_AUTH_TOKEN"),
            get("TWILIO_FROM_NUMBER"),
        ) {
            (Some(account_sid), Some(auth_token), Some(from_number)) => Some(TwilioConfig {
                account_sid,
                auth_token,
                from_number,
                base_url: or("TWILIO_BASE_URL", "https://api.twilio.com"),
            }),
            _ => None,
        };

        let calendly = match (get("CALENDLY_TOKEN"), get("CALENDLY_USER_URI")) {
            (Some(token), Some(user_uri)) => Some(CalendlyConfig {
                token,
                user_uri,
                base_url: or("CALENDLY_BASE_URL", "https://api.calendly.com"),
            }),
            _ => None,
        };

        Self {
            tenant: or("TENANT_ID", "default"),
            local_token_path: PathBuf::from(or("LOCAL_TOKEN_PATH", "tokens.json")),
            firestore,
            google,
            google_api: GoogleApiConfig {
                gmail_base_url: or("GMAIL_BASE_URL", "https://gmail.googleapis.com"),
                sheets_base_url: or("SHEETS_BASE_URL", "https://sheets.googleapis.com"),
            },
            openai: get("OPENAI_API_KEY").map(|api_key| OpenAiConfig {
                api_key,
                model: or("OPENAI_MODEL", "gpt-4o-mini"),
                base_url: or("OPENAI_BASE_URL", "https://api.openai.com"),
            }),
            stripe: get("STRIPE_SECRET_KEY").map(|secret_key| StripeConfig {
                secret_key,
                base_url: or("STRIPE_BASE_URL", "https://api.stripe.com"),
            }),
            meta,
            linkedin,
            hubspot: get("HUBSPOT_ACCESS_TOKEN").map(|access_token| HubSpotConfig {
                access_token,
                base_url: or("HUBSPOT_BASE_URL", "https://api.hubapi.com"),
            }),
            twilio,
            slack: get("SLACK_WEBHOOK_URL").map(|webhook_url| SlackConfig { webhook_url }),
            calendly,
        }
    }

    /// Which integrations have the configuration they need. Never echoes
    /// configuration values.
    pub fn configured(&self) -> BTreeMap<&'static str, bool> {
        let meta_with = |f: fn(&MetaConfig) -> bool| self.meta.as_ref().is_some_and(f);
        BTreeMap::from([
            ("firestore", self.firestore.is_some()),
            ("google", self.google.is_some()),
            ("openai", self.openai.is_some()),
            ("stripe", self.stripe.is_some()),
            ("facebook", meta_with(|m| m.page_id.is_some())),
            ("instagram", meta_with(|m| m.instagram_account_id.is_some())),
            ("linkedin", self.linkedin.is_some()),
            ("hubspot", self.hubspot.is_some()),
            ("twilio", self.twilio.is_some()),
            ("slack", self.slack.is_some()),
            ("calendly", self.calendly.is_some()),
        ])
    }
}
