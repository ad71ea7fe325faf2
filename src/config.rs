use std::env;

use crate::access::PlanConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    /// Bot API token for the chat transport. Absent = issuance API only.
    pub telegram_bot_token: Option<String>,
    /// Base URL of the remote processing backend (no trailing /process).
    pub backend_url: Option<String>,
    pub backend_framework: String,
    /// Shared secret required by POST /issue_paid_code.
    pub payment_api_secret: Option<String>,
    pub plan: PlanConfig,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let mut plan = PlanConfig::default();
        if let Some(requests) = env::var("PLAN_REQUESTS").ok().and_then(|v| v.parse().ok()) {
            plan.plan_requests = requests;
        }
        if let Some(days) = env::var("PLAN_DAYS").ok().and_then(|v| v.parse().ok()) {
            plan.plan_days = days;
        }
        if let Ok(price) = env::var("PLAN_PRICE") {
            plan.price_label = price;
        }
        plan.payment_link = env::var("PAYMENT_LINK").ok().filter(|s| !s.is_empty());

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "relaybot.db".to_string()),
            telegram_bot_token: env::var("TELEGRAM_BOT_TOKEN").ok().filter(|s| !s.is_empty()),
            backend_url: env::var("BACKEND_URL").ok().filter(|s| !s.is_empty()),
            backend_framework: env::var("BACKEND_FRAMEWORK")
                .unwrap_or_else(|_| "navigator".to_string()),
            payment_api_secret: env::var("PAYMENT_API_SECRET").ok().filter(|s| !s.is_empty()),
            plan,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
