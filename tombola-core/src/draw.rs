use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::FairnessError;

/// Participation pondérée telle que relue du stockage, dans l'ordre stable
/// d'enregistrement.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryWeight {
    pub user_id: String,
    pub tickets: u32,
}

/// Tirage pondéré classique par poids cumulés : un tirage, un gagnant.
///
/// La source aléatoire est injectée (valeurs dans [0, 1)) pour que les
/// tests fournissent des séquences fixes et que la production tire d'un
/// générateur uniforme. Aucun effet de bord : la persistance du gagnant et
/// la garantie "un seul tirage par tombola" appartiennent à l'appelant.
pub fn select_winner(
    entries: &[EntryWeight],
    mut random: impl FnMut() -> f64,
) -> Result<String, FairnessError> {
    let (last, rest) = entries.split_last().ok_or(FairnessError::NoEntries)?;

    let total: f64 = entries.iter().map(|e| e.tickets as f64).sum();
    if !total.is_finite() || total <= 0.0 {
        return Err(FairnessError::DegenerateWeights);
    }

    let mut r = random() * total;
    for entry in rest {
        r -= entry.tickets as f64;
        if r <= 0.0 {
            return Ok(entry.user_id.clone());
        }
    }

    // Bord flottant : si la soustraction cumulée ne repasse jamais sous
    // zéro avant le dernier participant, celui-ci gagne. Le tirage ne
    // reste jamais irrésolu.
    Ok(last.user_id.clone())
}

/// Tirage reproductible : même graine, mêmes participations, même gagnant.
pub fn select_winner_seeded(entries: &[EntryWeight], seed: u64) -> Result<String, FairnessError> {
    let mut rng = StdRng::seed_from_u64(seed);
    select_winner(entries, move || rng.random::<f64>())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, tickets: u32) -> EntryWeight {
        EntryWeight {
            user_id: id.to_string(),
            tickets,
        }
    }

    #[test]
    fn test_empty_entries_rejected() {
        assert_eq!(select_winner(&[], || 0.5), Err(FairnessError::NoEntries));
    }

    #[test]
    fn test_zero_total_rejected() {
        let entries = vec![entry("a", 0), entry("b", 0)];
        assert_eq!(
            select_winner(&entries, || 0.5),
            Err(FairnessError::DegenerateWeights)
        );
    }

    #[test]
    fn test_zero_draw_selects_first_weighted() {
        let entries = vec![entry("a", 10), entry("b", 0)];
        assert_eq!(select_winner(&entries, || 0.0).unwrap(), "a");
    }

    #[test]
    fn test_midpoint_draw_worked_example() {
        // total = 3, tirage = 1.5 ; 1.5 - 1 = 0.5, 0.5 - 1 = -0.5 <= 0 : b.
        let entries = vec![entry("a", 1), entry("b", 1), entry("c", 1)];
        assert_eq!(select_winner(&entries, || 0.5).unwrap(), "b");
    }

    #[test]
    fn test_near_one_draw_selects_last() {
        let entries = vec![entry("a", 1), entry("b", 1), entry("c", 1)];
        assert_eq!(select_winner(&entries, || 0.999_999).unwrap(), "c");
    }

    #[test]
    fn test_fallback_resolves_to_last() {
        // Source hors contrat (>= 1) : la boucle ne déclenche jamais r <= 0,
        // le repli doit désigner le dernier participant.
        let entries = vec![entry("a", 2), entry("b", 3)];
        assert_eq!(select_winner(&entries, || 1.5).unwrap(), "b");
    }

    #[test]
    fn test_single_entry_always_wins() {
        let entries = vec![entry("solo", 1)];
        for r in [0.0, 0.3, 0.999] {
            assert_eq!(select_winner(&entries, move || r).unwrap(), "solo");
        }
    }

    #[test]
    fn test_seeded_draw_deterministic() {
        let entries = vec![entry("a", 5), entry("b", 3), entry("c", 9)];
        let w1 = select_winner_seeded(&entries, 20260830).unwrap();
        let w2 = select_winner_seeded(&entries, 20260830).unwrap();
        assert_eq!(w1, w2);
    }

    #[test]
    fn test_heavy_weight_dominates_over_seeds() {
        // 999 tickets contre 1 : sur cent graines, l'écrasante majorité des
        // tirages doit revenir au poids lourd.
        let entries = vec![entry("lourd", 999), entry("léger", 1)];
        let wins = (0..100)
            .filter(|&s| select_winner_seeded(&entries, s).unwrap() == "lourd")
            .count();
        assert!(wins >= 95, "seulement {} victoires sur 100", wins);
    }
}
