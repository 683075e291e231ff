use std::env;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{ Deserialize, Serialize };

use crate::money::{ fits_ledger_scale, AMOUNT_SCALE };

/// A purchasable TON boost tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostPackage {
    pub id: i32,
    pub name: String,
    /// Price paid from the TON balance.
    pub price_ton: Decimal,
    /// Fraction of the boost deposit paid out per day, in TON.
    pub daily_rate: Decimal,
    /// One-off UNI bonus credited on purchase.
    pub bonus_uni: Decimal,
}

impl BoostPackage {
    pub fn defaults() -> Vec<BoostPackage> {
        vec![
            BoostPackage {
                id: 1,
                name: "Small Boost".to_string(),
                price_ton: Decimal::from(1),
                daily_rate: Decimal::new(5, 3),
                bonus_uni: Decimal::from(10_000),
            },
            BoostPackage {
                id: 2,
                name: "Medium Boost".to_string(),
                price_ton: Decimal::from(5),
                daily_rate: Decimal::new(1, 2),
                bonus_uni: Decimal::from(75_000),
            },
            BoostPackage {
                id: 3,
                name: "Large Boost".to_string(),
                price_ton: Decimal::from(15),
                daily_rate: Decimal::new(2, 2),
                bonus_uni: Decimal::from(250_000),
            },
            BoostPackage {
                id: 4,
                name: "Mega Boost".to_string(),
                price_ton: Decimal::from(25),
                daily_rate: Decimal::new(25, 3),
                bonus_uni: Decimal::from(500_000),
            }
        ]
    }
}

#[derive(Debug, Clone)]
pub struct AccrualConfig {
    pub interval_secs: u64,
    /// Daily rate given to a UNI farming position when it is first opened.
    pub uni_daily_rate: Decimal,
    /// Yields below this create no transaction; the cursor still advances.
    pub min_amount: Decimal,
}

impl Default for AccrualConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            uni_daily_rate: Decimal::new(1, 2),
            min_amount: Decimal::new(1, AMOUNT_SCALE),
        }
    }
}

/// Commission rate table, index 0 is level 1.
#[derive(Debug, Clone)]
pub struct ReferralConfig {
    pub max_levels: usize,
    pub rates: Vec<Decimal>,
}

impl ReferralConfig {
    /// 5% for level 1, 3% for 2-5, 2% for 6-10, 1% for 11-15.
    pub fn default_rates() -> Vec<Decimal> {
        (1..=15)
            .map(|level| match level {
                1 => Decimal::new(5, 2),
                2..=5 => Decimal::new(3, 2),
                6..=10 => Decimal::new(2, 2),
                _ => Decimal::new(1, 2),
            })
            .collect()
    }

    pub fn rate_for_level(&self, level: usize) -> Option<Decimal> {
        if level == 0 || level > self.max_levels {
            return None;
        }
        self.rates.get(level - 1).copied()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_levels == 0 {
            return Err("REFERRAL_MAX_LEVELS must be at least 1".to_string());
        }
        if self.rates.len() < self.max_levels {
            return Err(
                format!(
                    "REFERRAL_RATES has {} entries but REFERRAL_MAX_LEVELS is {}",
                    self.rates.len(),
                    self.max_levels
                )
            );
        }
        for rate in &self.rates {
            if rate.is_sign_negative() || *rate > Decimal::ONE {
                return Err(format!("Referral rate {} is outside [0, 1]", rate));
            }
        }
        if self.rates.windows(2).any(|pair| pair[1] > pair[0]) {
            return Err("REFERRAL_RATES must not increase with depth".to_string());
        }
        Ok(())
    }
}

impl Default for ReferralConfig {
    fn default() -> Self {
        Self {
            max_levels: 15,
            rates: Self::default_rates(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,
    pub request_timeout_secs: u64,
    pub accrual: AccrualConfig,
    pub referral: ReferralConfig,
    pub boost_packages: Vec<BoostPackage>,
    pub withdrawal_fee_ton: Decimal,
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenv::dotenv().ok();

        let database_url = env::var("DATABASE_URL")?;

        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()?;
        let request_timeout_secs = env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()?;

        let mut accrual = AccrualConfig::default();
        if let Ok(raw) = env::var("ACCRUAL_INTERVAL_SECS") {
            accrual.interval_secs = raw.parse()?;
        }
        if let Ok(raw) = env::var("UNI_FARMING_RATE") {
            accrual.uni_daily_rate = Decimal::from_str(&raw)?;
        }
        if let Ok(raw) = env::var("ACCRUAL_MIN_AMOUNT") {
            accrual.min_amount = Decimal::from_str(&raw)?;
        }
        if accrual.interval_secs == 0 {
            return Err("ACCRUAL_INTERVAL_SECS must be greater than zero".into());
        }

        let mut referral = ReferralConfig::default();
        if let Ok(raw) = env::var("REFERRAL_MAX_LEVELS") {
            referral.max_levels = raw.parse()?;
        }
        if let Ok(raw) = env::var("REFERRAL_RATES") {
            referral.rates = Self::parse_rates(&raw)?;
        }
        referral.validate()?;

        let boost_packages = match env::var("BOOST_PACKAGES_PATH") {
            Ok(path) => {
                let contents = std::fs::read_to_string(&path)?;
                serde_json::from_str(&contents)?
            }
            Err(_) => BoostPackage::defaults(),
        };
        Self::validate_packages(&boost_packages)?;

        let withdrawal_fee_ton = match env::var("WITHDRAWAL_FEE_TON") {
            Ok(raw) => Decimal::from_str(&raw)?,
            Err(_) => Decimal::ZERO,
        };
        if withdrawal_fee_ton.is_sign_negative() {
            return Err("WITHDRAWAL_FEE_TON must not be negative".into());
        }

        Ok(Config {
            database_url,
            server_host,
            server_port,
            request_timeout_secs,
            accrual,
            referral,
            boost_packages,
            withdrawal_fee_ton,
        })
    }

    fn parse_rates(raw: &str) -> Result<Vec<Decimal>, Box<dyn std::error::Error>> {
        let rates = raw
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(Decimal::from_str)
            .collect::<Result<Vec<_>, _>>()?;

        if rates.is_empty() {
            return Err("REFERRAL_RATES cannot be empty".into());
        }

        Ok(rates)
    }

    fn validate_packages(packages: &[BoostPackage]) -> Result<(), Box<dyn std::error::Error>> {
        let mut seen = std::collections::HashSet::new();
        for package in packages {
            if !seen.insert(package.id) {
                return Err(format!("Duplicate boost package id {}", package.id).into());
            }
            if package.price_ton <= Decimal::ZERO || !fits_ledger_scale(package.price_ton) {
                return Err(format!("Boost package {} has an invalid price", package.id).into());
            }
            if package.daily_rate.is_sign_negative() {
                return Err(format!("Boost package {} has a negative rate", package.id).into());
            }
            // Zero means no bonus row is written
            if package.bonus_uni.is_sign_negative() || !fits_ledger_scale(package.bonus_uni) {
                return Err(format!("Boost package {} has an invalid UNI bonus", package.id).into());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rates_cover_fifteen_levels() {
        let referral = ReferralConfig::default();
        assert!(referral.validate().is_ok());
        assert_eq!(referral.rate_for_level(1), Some(Decimal::new(5, 2)));
        assert_eq!(referral.rate_for_level(2), Some(Decimal::new(3, 2)));
        assert_eq!(referral.rate_for_level(15), Some(Decimal::new(1, 2)));
        assert_eq!(referral.rate_for_level(16), None);
        assert_eq!(referral.rate_for_level(0), None);
    }

    #[test]
    fn increasing_rates_are_rejected() {
        let referral = ReferralConfig {
            max_levels: 2,
            rates: vec![Decimal::new(1, 2), Decimal::new(5, 2)],
        };
        assert!(referral.validate().is_err());
    }

    #[test]
    fn short_rate_table_is_rejected() {
        let referral = ReferralConfig {
            max_levels: 3,
            rates: vec![Decimal::new(5, 2)],
        };
        assert!(referral.validate().is_err());
    }

    #[test]
    fn package_bonus_must_fit_the_ledger() {
        let mut packages = BoostPackage::defaults();
        packages[0].bonus_uni = Decimal::ZERO;
        assert!(Config::validate_packages(&packages).is_ok());

        packages[0].bonus_uni = Decimal::from(-1);
        assert!(Config::validate_packages(&packages).is_err());

        packages[0].bonus_uni = Decimal::new(1, 9);
        assert!(Config::validate_packages(&packages).is_err());

        let mut packages = BoostPackage::defaults();
        packages[2].price_ton = Decimal::new(123, 10);
        assert!(Config::validate_packages(&packages).is_err());
    }

    #[test]
    fn duplicate_package_ids_are_rejected() {
        let mut packages = BoostPackage::defaults();
        packages[1].id = 1;
        assert!(Config::validate_packages(&packages).is_err());
    }
}
