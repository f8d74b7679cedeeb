//! Configuration loading and validation
//!
//! Loaded once at process start and shared read-only afterwards. Sources, in
//! increasing priority: built-in defaults, the TOML file, `SNIPER__*` nested
//! environment variables, then the flat operator names (`AUTO_SNIPE_AMOUNT`,
//! `HARD_STOP_LOSS_PCT`, ...).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Upper bound for configured exit durations (ten years)
const MAX_DURATION_SECS: u64 = 10 * 365 * 86_400;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub filters: FilterConfig,
    #[serde(default)]
    pub bundling: BundlingConfig,
    #[serde(default)]
    pub probes: ProbeConfig,
    #[serde(default)]
    pub exits: ExitConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub journal: JournalConfig,
    #[serde(default)]
    pub positions: PositionsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TradingConfig {
    #[serde(default = "default_true")]
    pub auto_snipe_enabled: bool,
    /// Fixed buy size per accepted candidate, in base asset
    #[serde(default = "default_auto_snipe_amount")]
    pub auto_snipe_amount: f64,
    #[serde(default = "default_max_slippage_bps")]
    pub max_slippage_bps: u32,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            auto_snipe_enabled: true,
            auto_snipe_amount: default_auto_snipe_amount(),
            max_slippage_bps: default_max_slippage_bps(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FilterConfig {
    #[serde(default = "default_max_age_minutes")]
    pub max_age_minutes: u64,
    #[serde(default = "default_max_dev_holding_pct")]
    pub max_dev_holding_pct: f64,
    /// Entry band lower edge (USD); below it the candidate is deferred
    #[serde(default = "default_min_market_cap")]
    pub min_market_cap: f64,
    /// Entry band upper edge (USD); above it the candidate is rejected
    #[serde(default = "default_max_market_cap")]
    pub max_market_cap: f64,
    #[serde(default = "default_min_profit_multiple")]
    pub min_profit_multiple: f64,
    /// Market cap used as the reward target; falls back to `exits.migration_mcap`
    #[serde(default)]
    pub take_profit_target_mcap: Option<f64>,
    #[serde(default = "default_blocked_patterns")]
    pub blocked_patterns: Vec<String>,
    #[serde(default = "default_max_defer_attempts")]
    pub max_defer_attempts: u32,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            max_age_minutes: default_max_age_minutes(),
            max_dev_holding_pct: default_max_dev_holding_pct(),
            min_market_cap: default_min_market_cap(),
            max_market_cap: default_max_market_cap(),
            min_profit_multiple: default_min_profit_multiple(),
            take_profit_target_mcap: None,
            blocked_patterns: default_blocked_patterns(),
            max_defer_attempts: default_max_defer_attempts(),
        }
    }
}

/// Funding-graph collusion heuristics
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BundlingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Distinct top holders one funder may seed before the token is flagged
    #[serde(default = "default_common_funder_threshold")]
    pub common_funder_threshold: usize,
    /// Zero-nonce holder ratio that must be exceeded to flag
    #[serde(default = "default_zero_nonce_majority")]
    pub zero_nonce_majority: f64,
    /// Holders sharing one non-zero balance before the token is flagged (off when unset)
    #[serde(default)]
    pub identical_balance_threshold: Option<usize>,
}

impl Default for BundlingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            common_funder_threshold: default_common_funder_threshold(),
            zero_nonce_majority: default_zero_nonce_majority(),
            identical_balance_threshold: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProbeConfig {
    #[serde(default = "default_probe_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_market_data_timeout_ms")]
    pub market_data_timeout_ms: u64,
    #[serde(default = "default_min_liquidity_usd")]
    pub min_liquidity_usd: f64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_probe_timeout_ms(),
            market_data_timeout_ms: default_market_data_timeout_ms(),
            min_liquidity_usd: default_min_liquidity_usd(),
        }
    }
}

/// Where a take-profit rung sits
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfitThreshold {
    /// Multiple of the entry market cap
    Multiple(f64),
    /// Absolute market cap (USD)
    MarketCap(f64),
}

impl ProfitThreshold {
    /// Resolve to an absolute market cap for a given entry
    pub fn market_cap(&self, entry_mcap: f64) -> f64 {
        match self {
            ProfitThreshold::Multiple(m) => entry_mcap * m,
            ProfitThreshold::MarketCap(mcap) => *mcap,
        }
    }
}

/// One rung of the take-profit ladder
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct TakeProfitLevel {
    pub threshold: ProfitThreshold,
    /// Fraction of the original position sold at this rung
    pub sell_fraction: f64,
}

impl TakeProfitLevel {
    pub fn multiple(multiple: f64, sell_fraction: f64) -> Self {
        Self {
            threshold: ProfitThreshold::Multiple(multiple),
            sell_fraction,
        }
    }

    pub fn market_cap(mcap: f64, sell_fraction: f64) -> Self {
        Self {
            threshold: ProfitThreshold::MarketCap(mcap),
            sell_fraction,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExitConfig {
    #[serde(default = "default_take_profit_targets")]
    pub take_profit_targets: Vec<TakeProfitLevel>,
    /// Negative percent, e.g. -40.0
    #[serde(default = "default_hard_stop_loss_pct")]
    pub hard_stop_loss_pct: f64,
    #[serde(default = "default_trailing_min_profit_pct")]
    pub trailing_min_profit_pct: f64,
    #[serde(default = "default_trailing_drop_pct")]
    pub trailing_drop_pct: f64,
    #[serde(default = "default_max_hold_secs")]
    pub max_hold_secs: u64,
    /// No trade volume for this long closes the position
    #[serde(default = "default_no_volume_secs")]
    pub no_volume_secs: u64,
    #[serde(default = "default_migration_mcap")]
    pub migration_mcap: f64,
    /// Clock-driven re-evaluation interval for time-based exits
    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            take_profit_targets: default_take_profit_targets(),
            hard_stop_loss_pct: default_hard_stop_loss_pct(),
            trailing_min_profit_pct: default_trailing_min_profit_pct(),
            trailing_drop_pct: default_trailing_drop_pct(),
            max_hold_secs: default_max_hold_secs(),
            no_volume_secs: default_no_volume_secs(),
            migration_mcap: default_migration_mcap(),
            check_interval_ms: default_check_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RiskConfig {
    /// Portfolio value in base asset, used for percent limits
    #[serde(default = "default_portfolio_value")]
    pub portfolio_value: f64,
    #[serde(default = "default_max_concurrent_positions")]
    pub max_concurrent_positions: usize,
    #[serde(default = "default_max_position_size_pct")]
    pub max_position_size_pct: f64,
    #[serde(default = "default_daily_loss_ceiling_pct")]
    pub daily_loss_ceiling_pct: f64,
}

impl RiskConfig {
    /// Largest allowed single position in base asset
    pub fn max_position_size(&self) -> f64 {
        self.portfolio_value * self.max_position_size_pct / 100.0
    }

    /// Realized daily loss (base asset) that blocks new entries
    pub fn daily_loss_ceiling(&self) -> f64 {
        self.portfolio_value * self.daily_loss_ceiling_pct / 100.0
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            portfolio_value: default_portfolio_value(),
            max_concurrent_positions: default_max_concurrent_positions(),
            max_position_size_pct: default_max_position_size_pct(),
            daily_loss_ceiling_pct: default_daily_loss_ceiling_pct(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutionConfig {
    #[serde(default = "default_entry_retry_attempts")]
    pub entry_retry_attempts: u32,
    #[serde(default = "default_entry_retry_base_ms")]
    pub entry_retry_base_ms: u64,
    #[serde(default = "default_exit_retry_attempts")]
    pub exit_retry_attempts: u32,
    #[serde(default = "default_exit_retry_base_ms")]
    pub exit_retry_base_ms: u64,
    #[serde(default = "default_exit_retry_max_ms")]
    pub exit_retry_max_ms: u64,
    #[serde(default = "default_exit_slippage_bps")]
    pub exit_slippage_bps: u32,
    /// Per-position command queue depth
    #[serde(default = "default_command_buffer")]
    pub command_buffer: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            entry_retry_attempts: default_entry_retry_attempts(),
            entry_retry_base_ms: default_entry_retry_base_ms(),
            exit_retry_attempts: default_exit_retry_attempts(),
            exit_retry_base_ms: default_exit_retry_base_ms(),
            exit_retry_max_ms: default_exit_retry_max_ms(),
            exit_slippage_bps: default_exit_slippage_bps(),
            command_buffer: default_command_buffer(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct JournalConfig {
    /// JSON file the trade journal is persisted to (memory only when unset)
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PositionsConfig {
    /// JSON file open positions are persisted to and resumed from (memory only when unset)
    #[serde(default)]
    pub path: Option<String>,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_auto_snipe_amount() -> f64 {
    5.0
}

fn default_max_slippage_bps() -> u32 {
    1500
}

fn default_max_age_minutes() -> u64 {
    30
}

fn default_max_dev_holding_pct() -> f64 {
    8.0
}

fn default_min_market_cap() -> f64 {
    15_000.0
}

fn default_max_market_cap() -> f64 {
    25_000.0
}

fn default_min_profit_multiple() -> f64 {
    2.0
}

fn default_blocked_patterns() -> Vec<String> {
    vec![r"(?i)\b(test|scam|rug|honeypot|fake)\b".to_string()]
}

fn default_max_defer_attempts() -> u32 {
    10
}

fn default_common_funder_threshold() -> usize {
    3
}

fn default_zero_nonce_majority() -> f64 {
    0.5
}

fn default_probe_timeout_ms() -> u64 {
    1500
}

fn default_market_data_timeout_ms() -> u64 {
    2000
}

fn default_min_liquidity_usd() -> f64 {
    5_000.0
}

fn default_take_profit_targets() -> Vec<TakeProfitLevel> {
    vec![
        TakeProfitLevel::multiple(2.5, 0.5),
        TakeProfitLevel::multiple(5.0, 1.0),
    ]
}

fn default_hard_stop_loss_pct() -> f64 {
    -40.0
}

fn default_trailing_min_profit_pct() -> f64 {
    50.0
}

fn default_trailing_drop_pct() -> f64 {
    20.0
}

fn default_max_hold_secs() -> u64 {
    48 * 3600
}

fn default_no_volume_secs() -> u64 {
    600
}

fn default_migration_mcap() -> f64 {
    250_000.0
}

fn default_check_interval_ms() -> u64 {
    5000
}

fn default_portfolio_value() -> f64 {
    500.0
}

fn default_max_concurrent_positions() -> usize {
    5
}

fn default_max_position_size_pct() -> f64 {
    1.0
}

fn default_daily_loss_ceiling_pct() -> f64 {
    5.0
}

fn default_entry_retry_attempts() -> u32 {
    3
}

fn default_entry_retry_base_ms() -> u64 {
    200
}

fn default_exit_retry_attempts() -> u32 {
    8
}

fn default_exit_retry_base_ms() -> u64 {
    50
}

fn default_exit_retry_max_ms() -> u64 {
    1000
}

fn default_exit_slippage_bps() -> u32 {
    2500
}

fn default_command_buffer() -> usize {
    256
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix SNIPER_)
            .add_source(
                config::Environment::with_prefix("SNIPER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let mut config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.apply_env_overrides(|key| std::env::var(key).ok())?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Apply the flat operator-facing variable names on top of the loaded tree
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T>
        where
            T::Err: std::fmt::Display,
        {
            raw.trim()
                .parse::<T>()
                .map_err(|e| anyhow::anyhow!("Invalid value for {}: {} ({})", key, raw, e))
        }

        if let Some(v) = lookup("AUTO_SNIPE_AMOUNT") {
            self.trading.auto_snipe_amount = parsed("AUTO_SNIPE_AMOUNT", &v)?;
        }
        if let Some(v) = lookup("MAX_AGE_MINUTES") {
            self.filters.max_age_minutes = parsed("MAX_AGE_MINUTES", &v)?;
        }
        if let Some(v) = lookup("MAX_DEV_HOLDING_PCT") {
            self.filters.max_dev_holding_pct = parsed("MAX_DEV_HOLDING_PCT", &v)?;
        }
        if let Some(v) = lookup("MIN_MARKET_CAP") {
            self.filters.min_market_cap = parsed("MIN_MARKET_CAP", &v)?;
        }
        if let Some(v) = lookup("MAX_MARKET_CAP") {
            self.filters.max_market_cap = parsed("MAX_MARKET_CAP", &v)?;
        }
        if let Some(v) = lookup("TAKE_PROFIT_TARGETS") {
            self.exits.take_profit_targets = parse_take_profit_targets(&v)?;
        }
        if let Some(v) = lookup("HARD_STOP_LOSS_PCT") {
            self.exits.hard_stop_loss_pct = parsed("HARD_STOP_LOSS_PCT", &v)?;
        }
        if let Some(v) = lookup("TRAILING_MIN_PROFIT_PCT") {
            self.exits.trailing_min_profit_pct = parsed("TRAILING_MIN_PROFIT_PCT", &v)?;
        }
        if let Some(v) = lookup("TRAILING_DROP_PCT") {
            self.exits.trailing_drop_pct = parsed("TRAILING_DROP_PCT", &v)?;
        }
        if let Some(v) = lookup("MAX_HOLD_DURATION") {
            self.exits.max_hold_secs = parse_duration_secs(&v)?;
        }
        if let Some(v) = lookup("MIGRATION_MCAP") {
            self.exits.migration_mcap = parsed("MIGRATION_MCAP", &v)?;
        }
        if let Some(v) = lookup("MAX_CONCURRENT_POSITIONS") {
            self.risk.max_concurrent_positions = parsed("MAX_CONCURRENT_POSITIONS", &v)?;
        }
        if let Some(v) = lookup("MAX_POSITION_SIZE_PCT") {
            self.risk.max_position_size_pct = parsed("MAX_POSITION_SIZE_PCT", &v)?;
        }
        if let Some(v) = lookup("DAILY_LOSS_CEILING_PCT") {
            self.risk.daily_loss_ceiling_pct = parsed("DAILY_LOSS_CEILING_PCT", &v)?;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.trading.auto_snipe_amount <= 0.0 {
            anyhow::bail!("auto_snipe_amount must be positive");
        }

        if self.trading.max_slippage_bps > 10000 || self.execution.exit_slippage_bps > 10000 {
            anyhow::bail!("slippage cannot exceed 10000 bps (100%)");
        }

        if self.filters.min_market_cap < 0.0
            || self.filters.min_market_cap >= self.filters.max_market_cap
        {
            anyhow::bail!(
                "entry band must satisfy 0 <= min_market_cap < max_market_cap, got {}..{}",
                self.filters.min_market_cap,
                self.filters.max_market_cap
            );
        }

        if !(0.0..=100.0).contains(&self.filters.max_dev_holding_pct) {
            anyhow::bail!("max_dev_holding_pct must be between 0 and 100");
        }

        for pattern in &self.filters.blocked_patterns {
            regex::Regex::new(pattern)
                .with_context(|| format!("Invalid blocked_pattern regex: {}", pattern))?;
        }

        if self.bundling.common_funder_threshold < 2 {
            anyhow::bail!("common_funder_threshold must be at least 2");
        }

        if !(0.0..1.0).contains(&self.bundling.zero_nonce_majority) {
            anyhow::bail!("zero_nonce_majority must be in [0, 1)");
        }

        if self.exits.hard_stop_loss_pct >= 0.0 || self.exits.hard_stop_loss_pct <= -100.0 {
            anyhow::bail!("hard_stop_loss_pct must be between -100 and 0 (exclusive)");
        }

        if self.exits.trailing_drop_pct <= 0.0 || self.exits.trailing_drop_pct >= 100.0 {
            anyhow::bail!("trailing_drop_pct must be between 0 and 100");
        }

        if self.exits.trailing_min_profit_pct < 0.0 {
            anyhow::bail!("trailing_min_profit_pct cannot be negative");
        }

        if self.exits.max_hold_secs > MAX_DURATION_SECS
            || self.exits.no_volume_secs > MAX_DURATION_SECS
        {
            anyhow::bail!("exit durations cannot exceed {} seconds", MAX_DURATION_SECS);
        }

        if self.exits.migration_mcap <= self.filters.max_market_cap {
            anyhow::bail!("migration_mcap must be above the entry band");
        }

        let mut last_multiple = 1.0;
        let mut last_mcap = 0.0;
        for level in &self.exits.take_profit_targets {
            if level.sell_fraction <= 0.0 || level.sell_fraction > 1.0 {
                anyhow::bail!(
                    "take-profit sell_fraction must be in (0, 1], got {}",
                    level.sell_fraction
                );
            }
            match level.threshold {
                ProfitThreshold::Multiple(m) => {
                    if m <= last_multiple {
                        anyhow::bail!("take-profit multiples must be ascending and above 1x");
                    }
                    last_multiple = m;
                }
                ProfitThreshold::MarketCap(mcap) => {
                    if mcap <= last_mcap {
                        anyhow::bail!("take-profit market caps must be ascending and positive");
                    }
                    last_mcap = mcap;
                }
            }
        }

        if self.risk.max_concurrent_positions == 0 {
            anyhow::bail!("max_concurrent_positions must be at least 1");
        }

        if self.risk.portfolio_value <= 0.0 {
            anyhow::bail!("portfolio_value must be positive");
        }

        if self.risk.max_position_size_pct <= 0.0 || self.risk.max_position_size_pct > 100.0 {
            anyhow::bail!("max_position_size_pct must be in (0, 100]");
        }

        if self.risk.daily_loss_ceiling_pct <= 0.0 {
            anyhow::bail!("daily_loss_ceiling_pct must be positive");
        }

        if self.execution.entry_retry_attempts == 0 || self.execution.exit_retry_attempts == 0 {
            anyhow::bail!("retry attempts must be at least 1");
        }

        if self.execution.command_buffer == 0 {
            anyhow::bail!("command_buffer must be at least 1");
        }

        Ok(())
    }

    /// Get configuration for display
    pub fn masked_display(&self) -> String {
        let ladder: Vec<String> = self
            .exits
            .take_profit_targets
            .iter()
            .map(|l| match l.threshold {
                ProfitThreshold::Multiple(m) => format!("{}x:{}", m, l.sell_fraction),
                ProfitThreshold::MarketCap(c) => format!("${:.0}:{}", c, l.sell_fraction),
            })
            .collect();

        format!(
            r#"Configuration:
  Trading:
    auto_snipe: {} ({} per entry)
    max_slippage: {}bps
  Filters:
    max_age: {} min
    max_dev_holding: {}%
    entry_band: ${:.0} - ${:.0}
    min_profit_multiple: {}x
  Bundling:
    enabled: {}
    common_funder_threshold: {}
  Exits:
    take_profit: [{}]
    hard_stop_loss: {}%
    trailing: activate >{}%, drop {}%
    max_hold: {}s
    no_volume: {}s
    migration: ${:.0}
  Risk:
    portfolio: {}
    max_concurrent: {}
    max_position: {}% ({:.4})
    daily_loss_ceiling: {}% ({:.4})
  Journal:
    path: {}
  Positions:
    path: {}
"#,
            self.trading.auto_snipe_enabled,
            self.trading.auto_snipe_amount,
            self.trading.max_slippage_bps,
            self.filters.max_age_minutes,
            self.filters.max_dev_holding_pct,
            self.filters.min_market_cap,
            self.filters.max_market_cap,
            self.filters.min_profit_multiple,
            self.bundling.enabled,
            self.bundling.common_funder_threshold,
            ladder.join(", "),
            self.exits.hard_stop_loss_pct,
            self.exits.trailing_min_profit_pct,
            self.exits.trailing_drop_pct,
            self.exits.max_hold_secs,
            self.exits.no_volume_secs,
            self.exits.migration_mcap,
            self.risk.portfolio_value,
            self.risk.max_concurrent_positions,
            self.risk.max_position_size_pct,
            self.risk.max_position_size(),
            self.risk.daily_loss_ceiling_pct,
            self.risk.daily_loss_ceiling(),
            self.journal.path.as_deref().unwrap_or("(memory only)"),
            self.positions.path.as_deref().unwrap_or("(memory only)"),
        )
    }
}

/// Parse `2.5x:0.5,5x:1.0` / `120000:0.25` ladders
pub fn parse_take_profit_targets(raw: &str) -> Result<Vec<TakeProfitLevel>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|entry| {
            let (threshold, fraction) = entry
                .split_once(':')
                .with_context(|| format!("take-profit entry '{}' must be threshold:fraction", entry))?;
            let sell_fraction: f64 = fraction
                .trim()
                .parse()
                .with_context(|| format!("Invalid sell fraction in '{}'", entry))?;
            let threshold = threshold.trim();
            let level = match threshold.strip_suffix(['x', 'X']) {
                Some(multiple) => TakeProfitLevel::multiple(
                    multiple
                        .trim()
                        .parse()
                        .with_context(|| format!("Invalid multiple in '{}'", entry))?,
                    sell_fraction,
                ),
                None => TakeProfitLevel::market_cap(
                    threshold
                        .parse()
                        .with_context(|| format!("Invalid market cap in '{}'", entry))?,
                    sell_fraction,
                ),
            };
            Ok(level)
        })
        .collect()
}

/// Parse `600`, `600s`, `30m` or `48h` into seconds
pub fn parse_duration_secs(raw: &str) -> Result<u64> {
    let raw = raw.trim();
    let (digits, scale) = match raw.chars().last() {
        Some('s') => (&raw[..raw.len() - 1], 1),
        Some('m') => (&raw[..raw.len() - 1], 60),
        Some('h') => (&raw[..raw.len() - 1], 3600),
        _ => (raw, 1),
    };
    let value: u64 = digits
        .trim()
        .parse()
        .with_context(|| format!("Invalid duration: {}", raw))?;
    match value.checked_mul(scale) {
        Some(secs) => Ok(secs),
        None => anyhow::bail!("Duration out of range: {}", raw),
    }
}
