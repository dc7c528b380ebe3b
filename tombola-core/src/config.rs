use serde::{Deserialize, Serialize};

use crate::error::FairnessError;

/// Paramètres d'équité convertissant points et parrainages en tickets.
///
/// Immuable pendant un calcul : toujours passé explicitement, jamais lu
/// depuis un état global, pour que chaque recalcul soit reproductible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FairnessConfig {
    /// Tickets minimum accordés à chaque participant, activité ou non.
    pub base: f64,
    /// Diviseur de points : chaque bloc de `points_divisor` points vaut
    /// `alpha` tickets (division entière).
    pub points_divisor: u32,
    /// Poids d'un bloc de points.
    pub alpha: f64,
    /// Poids d'un parrainage (jusqu'au plafond), et coefficient du terme
    /// logarithmique au-delà.
    pub beta: f64,
    /// Plafond de parrainages comptés linéairement.
    pub referral_cap: u32,
    /// Plafond absolu de tickets par participant, appliqué avant le
    /// plafonnement relatif à la médiane.
    pub max_tickets: f64,
    /// Nul ne peut détenir plus de `ratio_cap` fois la médiane des tickets.
    pub ratio_cap: f64,
    /// Plancher strictement positif : aucune probabilité exactement nulle.
    pub epsilon: f64,
}

impl Default for FairnessConfig {
    fn default() -> Self {
        Self {
            base: 1.0,
            points_divisor: 50,
            alpha: 1.0,
            beta: 2.0,
            referral_cap: 20,
            max_tickets: 500.0,
            ratio_cap: 5.0,
            epsilon: 0.0001,
        }
    }
}

impl FairnessConfig {
    /// Vérifie le domaine de chaque champ. Aucun calcul n'est tenté avec
    /// une configuration invalide.
    pub fn validate(&self) -> Result<(), FairnessError> {
        if !self.base.is_finite() || self.base < 0.0 {
            return Err(FairnessError::InvalidConfig(format!(
                "base doit être un réel fini >= 0 (reçu {})",
                self.base
            )));
        }
        if self.points_divisor == 0 {
            return Err(FairnessError::InvalidConfig(
                "points_divisor doit être un entier >= 1".to_string(),
            ));
        }
        if !self.alpha.is_finite() || self.alpha < 0.0 {
            return Err(FairnessError::InvalidConfig(format!(
                "alpha doit être un réel fini >= 0 (reçu {})",
                self.alpha
            )));
        }
        if !self.beta.is_finite() || self.beta < 0.0 {
            return Err(FairnessError::InvalidConfig(format!(
                "beta doit être un réel fini >= 0 (reçu {})",
                self.beta
            )));
        }
        if !self.max_tickets.is_finite() || self.max_tickets <= 0.0 {
            return Err(FairnessError::InvalidConfig(format!(
                "max_tickets doit être un réel fini > 0 (reçu {})",
                self.max_tickets
            )));
        }
        if !self.ratio_cap.is_finite() || self.ratio_cap < 1.0 {
            return Err(FairnessError::InvalidConfig(format!(
                "ratio_cap doit être un réel fini >= 1 (reçu {})",
                self.ratio_cap
            )));
        }
        if !self.epsilon.is_finite() || self.epsilon <= 0.0 {
            return Err(FairnessError::InvalidConfig(format!(
                "epsilon doit être un réel fini > 0 (reçu {})",
                self.epsilon
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = FairnessConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.points_divisor, 50);
        assert!((config.epsilon - 0.0001).abs() < 1e-12);
    }

    #[test]
    fn test_negative_base_rejected() {
        let config = FairnessConfig {
            base: -1.0,
            ..FairnessConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(FairnessError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_zero_divisor_rejected() {
        let config = FairnessConfig {
            points_divisor: 0,
            ..FairnessConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ratio_cap_below_one_rejected() {
        let config = FairnessConfig {
            ratio_cap: 0.5,
            ..FairnessConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_epsilon_rejected() {
        let config = FairnessConfig {
            epsilon: 0.0,
            ..FairnessConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_nan_fields_rejected() {
        for field in 0..4 {
            let mut config = FairnessConfig::default();
            match field {
                0 => config.base = f64::NAN,
                1 => config.alpha = f64::INFINITY,
                2 => config.max_tickets = f64::NAN,
                3 => config.ratio_cap = f64::NAN,
                _ => unreachable!(),
            }
            assert!(config.validate().is_err(), "champ {} accepté à tort", field);
        }
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let config = FairnessConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let restored: FairnessConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, config);
    }
}
