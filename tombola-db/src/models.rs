use anyhow::{bail, Result};

#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub points: u32,
    pub referral_code: String,
    pub referred_by: Option<String>,
    pub is_anonymous: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GiveawayStatus {
    Active,
    Ended,
    Cancelled,
}

impl GiveawayStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GiveawayStatus::Active => "active",
            GiveawayStatus::Ended => "ended",
            GiveawayStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(GiveawayStatus::Active),
            "ended" => Ok(GiveawayStatus::Ended),
            "cancelled" => Ok(GiveawayStatus::Cancelled),
            other => bail!("Statut de tombola inconnu : '{}'", other),
        }
    }
}

impl std::fmt::Display for GiveawayStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Giveaway {
    pub id: String,
    pub title: String,
    pub description: String,
    pub prize_description: String,
    pub end_date: String,
    pub status: GiveawayStatus,
    pub max_entries: Option<u32>,
    pub entry_count: u32,
    pub winner_id: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct Task {
    pub id: String,
    pub giveaway_id: String,
    pub title: String,
    pub kind: String,
    pub points: u32,
    pub position: u32,
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub id: String,
    pub user_id: String,
    pub giveaway_id: String,
    pub tickets: u32,
    pub probability: f64,
    pub joined_at: String,
}

#[derive(Debug, Clone)]
pub struct Donation {
    pub id: String,
    pub user_id: Option<String>,
    pub donor_name: String,
    pub amount: f64,
    pub currency: String,
    pub payment_status: String,
    pub is_anonymous: bool,
    pub message: Option<String>,
    pub created_at: String,
}

/// Ligne du classement d'une tombola, triée par tickets décroissants.
#[derive(Debug, Clone)]
pub struct LeaderboardRow {
    pub user_id: String,
    pub display_name: String,
    pub is_anonymous: bool,
    pub tickets: u32,
    pub probability: f64,
}

/// Ligne du classement des donateurs, agrégée par donateur.
#[derive(Debug, Clone)]
pub struct DonorRow {
    pub display_name: String,
    pub is_anonymous: bool,
    pub total_amount: f64,
    pub donation_count: u32,
}

#[derive(Debug, Clone)]
pub struct PlatformStats {
    pub active_giveaways: u32,
    pub total_winners: u32,
    pub points_distributed: u64,
}

pub fn validate_donation_amount(amount: f64) -> Result<()> {
    if !amount.is_finite() || amount < 1.0 {
        bail!("Montant de don invalide : {} (minimum 1)", amount);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            GiveawayStatus::Active,
            GiveawayStatus::Ended,
            GiveawayStatus::Cancelled,
        ] {
            assert_eq!(GiveawayStatus::parse(status.as_str()).unwrap(), status);
        }
    }

    #[test]
    fn test_unknown_status_rejected() {
        assert!(GiveawayStatus::parse("paused").is_err());
        assert!(GiveawayStatus::parse("").is_err());
    }

    #[test]
    fn test_donation_amount_minimum() {
        assert!(validate_donation_amount(1.0).is_ok());
        assert!(validate_donation_amount(250.5).is_ok());
        assert!(validate_donation_amount(0.99).is_err());
        assert!(validate_donation_amount(-5.0).is_err());
        assert!(validate_donation_amount(f64::NAN).is_err());
    }
}
