//! Severity classification of sensor readings
//!
//! Every reading is classified against a table of threshold rules. A rule
//! matches a sensor kind when all of its keywords appear (case-insensitive)
//! in the kind. When several rules match, the one with the most keywords
//! wins, so "humedad de suelo" uses the soil moisture rule rather than the
//! generic humidity rule.
//!
//! ```text
//! value < critical_below  or  value > critical_above  → Critical
//! value < warning_below   or  value > warning_above   → Warning
//! otherwise                                           → Normal
//! ```

use std::fmt;

use anyhow::bail;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeverityTier {
    Normal,
    Warning,
    Critical,
}

impl SeverityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeverityTier::Normal => "normal",
            SeverityTier::Warning => "warning",
            SeverityTier::Critical => "critical",
        }
    }
}

impl fmt::Display for SeverityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SeverityTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(SeverityTier::Normal),
            "warning" => Ok(SeverityTier::Warning),
            "critical" => Ok(SeverityTier::Critical),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

/// A threshold rule for one kind of sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRule {
    pub name: String,

    /// All keywords must be contained in the (lowercased) sensor kind
    pub keywords: Vec<String>,

    #[serde(default)]
    pub critical_below: Option<f64>,
    #[serde(default)]
    pub critical_above: Option<f64>,
    #[serde(default)]
    pub warning_below: Option<f64>,
    #[serde(default)]
    pub warning_above: Option<f64>,
}

impl ThresholdRule {
    fn matches(&self, kind: &str) -> bool {
        !self.keywords.is_empty()
            && self
                .keywords
                .iter()
                .all(|keyword| kind.contains(&keyword.to_lowercase()))
    }

    pub fn evaluate(&self, value: f64) -> SeverityTier {
        let below = |limit: Option<f64>| limit.is_some_and(|limit| value < limit);
        let above = |limit: Option<f64>| limit.is_some_and(|limit| value > limit);

        if below(self.critical_below) || above(self.critical_above) {
            return SeverityTier::Critical;
        }

        if below(self.warning_below) || above(self.warning_above) {
            return SeverityTier::Warning;
        }

        SeverityTier::Normal
    }

    /// Check that the warning band sits inside the critical band
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.matches_anything() {
            bail!("threshold rule `{}` has no keywords", self.name);
        }

        let limits = [
            self.critical_below,
            self.critical_above,
            self.warning_below,
            self.warning_above,
        ];
        if limits.iter().flatten().any(|limit| !limit.is_finite()) {
            bail!("threshold rule `{}` has a non-finite limit", self.name);
        }

        if let (Some(critical), Some(warning)) = (self.critical_below, self.warning_below)
            && critical > warning
        {
            bail!(
                "threshold rule `{}`: critical_below ({critical}) must not exceed warning_below ({warning})",
                self.name
            );
        }

        if let (Some(critical), Some(warning)) = (self.critical_above, self.warning_above)
            && critical < warning
        {
            bail!(
                "threshold rule `{}`: critical_above ({critical}) must not be lower than warning_above ({warning})",
                self.name
            );
        }

        Ok(())
    }

    fn matches_anything(&self) -> bool {
        self.keywords.iter().any(|k| !k.trim().is_empty())
    }
}

/// Ordered set of threshold rules
#[derive(Debug, Clone, PartialEq)]
pub struct Classifier {
    rules: Vec<ThresholdRule>,
}

impl Classifier {
    pub fn new(rules: Vec<ThresholdRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[ThresholdRule] {
        &self.rules
    }

    /// Find the most specific rule for a sensor kind
    pub fn rule_for(&self, sensor_kind: &str) -> Option<&ThresholdRule> {
        let kind = sensor_kind.to_lowercase();

        self.rules
            .iter()
            .filter(|rule| rule.matches(&kind))
            // max_by_key keeps the last maximum, reverse so the first declared wins ties
            .rev()
            .max_by_key(|rule| rule.keywords.len())
    }

    /// Classify a reading; unknown sensor kinds are always `Normal`
    pub fn classify(&self, sensor_kind: &str, value: f64) -> SeverityTier {
        self.rule_for(sensor_kind)
            .map_or(SeverityTier::Normal, |rule| rule.evaluate(value))
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

/// Canonical threshold table used when the configuration does not provide one
pub fn default_rules() -> Vec<ThresholdRule> {
    fn rule(
        name: &str,
        keywords: &[&str],
        critical_below: Option<f64>,
        warning_below: Option<f64>,
        warning_above: Option<f64>,
        critical_above: Option<f64>,
    ) -> ThresholdRule {
        ThresholdRule {
            name: name.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            critical_below,
            critical_above,
            warning_below,
            warning_above,
        }
    }

    vec![
        rule(
            "temperature",
            &["temperatura"],
            Some(5.0),
            Some(10.0),
            Some(30.0),
            Some(35.0),
        ),
        rule(
            "soil_moisture",
            &["humedad", "suelo"],
            Some(20.0),
            Some(30.0),
            Some(80.0),
            Some(90.0),
        ),
        rule(
            "humidity",
            &["humedad"],
            Some(30.0),
            Some(40.0),
            Some(80.0),
            Some(90.0),
        ),
        rule(
            "light",
            &["luminosidad"],
            Some(50.0),
            Some(100.0),
            None,
            None,
        ),
    ]
}
