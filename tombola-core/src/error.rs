use thiserror::Error;

/// Erreurs du moteur d'équité. Toutes sont déterministes : mêmes entrées,
/// même erreur — aucun cas transitoire à réessayer.
#[derive(Debug, Error, PartialEq)]
pub enum FairnessError {
    /// Un champ de la configuration est hors de son domaine de validité.
    #[error("configuration invalide : {0}")]
    InvalidConfig(String),

    /// Tirage demandé sans aucune participation.
    #[error("aucune participation : tirage impossible")]
    NoEntries,

    /// Poids total nul ou non fini malgré des participations — signale une
    /// corruption de données en amont, pas un cas à masquer.
    #[error("poids dégénérés : total de tickets nul ou non fini")]
    DegenerateWeights,
}
