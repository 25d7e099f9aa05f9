//! Runtime Configuration

use std::net::SocketAddr;

use anyhow::Context;
use board_core::{Role, Viewer};
use board_payments::{FlowConfig, PollConfig};

/// Everything the host reads from the environment
#[derive(Clone, Debug)]
pub struct CheckoutConfig {
    /// Where the completion callback is served
    pub bind_addr: SocketAddr,

    /// Host completion messages must originate from
    pub app_host: String,

    pub user_id: Option<i64>,
    pub role: Option<Role>,
    pub employee_id: Option<i64>,
    pub employer_id: Option<i64>,

    /// Plan to buy; the cheapest eligible plan when unset
    pub plan_id: Option<i64>,

    /// Run against the in-memory backend
    pub demo: bool,

    pub poll: PollConfig,
    pub auto_close: bool,
}

fn var(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn int_var(key: &str) -> anyhow::Result<Option<i64>> {
    var(key)
        .map(|raw| raw.parse::<i64>().with_context(|| format!("{key} must be an integer, got {raw:?}")))
        .transpose()
}

fn flag(key: &str) -> bool {
    var(key).is_some_and(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

impl CheckoutConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let bind_addr = var("BIND_ADDR")
            .unwrap_or_else(|| "127.0.0.1:3000".into())
            .parse()
            .context("BIND_ADDR must be host:port")?;

        let role = var("BOARD_ROLE_ID")
            .map(|raw| raw.parse::<Role>())
            .transpose()
            .context("BOARD_ROLE_ID is not a known role")?;

        Ok(Self {
            bind_addr,
            app_host: var("BOARD_APP_HOST").unwrap_or_else(|| bind_addr.to_string()),
            user_id: int_var("BOARD_USER_ID")?,
            role,
            employee_id: int_var("BOARD_EMPLOYEE_ID")?,
            employer_id: int_var("BOARD_EMPLOYER_ID")?,
            plan_id: int_var("BOARD_PLAN_ID")?,
            demo: flag("BOARD_DEMO"),
            poll: PollConfig::from_env(),
            auto_close: flag("BOARD_AUTO_CLOSE"),
        })
    }

    pub fn viewer(&self) -> Viewer {
        Viewer {
            user_id: self.user_id,
            role: self.role,
            employee_id: self.employee_id,
            employer_id: self.employer_id,
        }
    }

    pub fn flow(&self) -> FlowConfig {
        let config = FlowConfig::new(self.app_host.clone()).with_poll(self.poll.clone());
        if self.auto_close { config.auto_closing() } else { config }
    }
}
