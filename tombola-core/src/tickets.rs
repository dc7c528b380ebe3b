use crate::config::FairnessConfig;
use crate::error::FairnessError;

/// Participant à une tombola : points et parrainages courants, plus les
/// identifiants opaques fournis par la couche de stockage.
#[derive(Debug, Clone, PartialEq)]
pub struct Entrant {
    pub user_id: String,
    pub entry_id: String,
    pub points: u32,
    pub referrals: u32,
}

/// Résultat du calcul, une ligne par participant, dans le même ordre.
#[derive(Debug, Clone, PartialEq)]
pub struct TicketResult {
    pub user_id: String,
    pub entry_id: String,
    /// Partie entière des tickets plafonnés.
    pub tickets: u32,
    /// Part de la masse de probabilité, arrondie à six décimales.
    pub probability: f64,
}

/// Tickets bruts d'un participant, avant plafonnement relatif à la médiane.
fn raw_tickets(entrant: &Entrant, config: &FairnessConfig) -> f64 {
    let mut t = config.base;
    t += (entrant.points / config.points_divisor) as f64 * config.alpha;
    t += entrant.referrals.min(config.referral_cap) as f64 * config.beta;
    // Rendements décroissants au-delà du plafond : log2(1) = 0, donc zéro
    // contribution pour tout participant sous le plafond.
    let excess = entrant.referrals.saturating_sub(config.referral_cap);
    t += config.beta * (1.0 + excess as f64).log2();
    t = t.min(config.max_tickets);
    t + config.epsilon
}

/// Médiane des tickets bruts : élément médian-inférieur de la liste triée
/// (indice `n/2`), sans interpolation pour les listes paires. Ce choix est
/// reproduit tel quel : l'équité exige la même médiane que l'existant.
/// Retombe sur 1 si la valeur médiane est dégénérée (non positive).
fn median_tickets(raw: &[f64]) -> f64 {
    let mut sorted = raw.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    match sorted.get(sorted.len() / 2) {
        Some(&m) if m > 0.0 => m,
        _ => 1.0,
    }
}

fn round6(x: f64) -> f64 {
    (x * 1_000_000.0).round() / 1_000_000.0
}

/// Convertit points et parrainages en tickets pondérés et probabilités de
/// gain normalisées, pour l'ensemble des participants d'une tombola.
///
/// Le calcul est global et non incrémental : la médiane et le total
/// dépendent de tout l'ensemble, donc chaque événement qui modifie points
/// ou parrainages doit repasser tous les participants de la tombola.
pub fn compute_tickets(
    entrants: &[Entrant],
    config: &FairnessConfig,
) -> Result<Vec<TicketResult>, FairnessError> {
    config.validate()?;

    if entrants.is_empty() {
        return Ok(Vec::new());
    }

    let raw: Vec<f64> = entrants.iter().map(|e| raw_tickets(e, config)).collect();

    let median = median_tickets(&raw);
    let capped: Vec<f64> = raw
        .iter()
        .map(|&t| t.min(config.ratio_cap * median))
        .collect();

    let total: f64 = capped.iter().sum();
    if !total.is_finite() || total <= 0.0 {
        return Err(FairnessError::DegenerateWeights);
    }

    Ok(entrants
        .iter()
        .zip(capped.iter())
        .map(|(entrant, &t)| TicketResult {
            user_id: entrant.user_id.clone(),
            entry_id: entrant.entry_id.clone(),
            tickets: t.floor() as u32,
            probability: round6(t / total),
        })
        .collect())
}
