// core/suggestion_tracker.rs
use serde::{Deserialize, Serialize};

use crate::models::{Suggestion, SuggestionsGenerees};

/// Bilan des modifications d'un lot de suggestions par rapport à la
/// référence machine d'origine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EtatModifications {
    /// Nombre de suggestions dont le produit proposé a changé
    pub produits_modifies: usize,

    /// Vrai si au moins une justification a été modifiée
    pub justifications_modifiees: bool,

    /// Vrai si le texte de synthèse a été modifié
    pub synthese_modifiee: bool,

    /// Produits changés dont la justification est restée celle d'origine
    pub produits_sans_nouvelle_justification: usize,
}

impl EtatModifications {
    /// Vrai si un produit a changé sans que sa justification ne suive :
    /// une édition désynchronisée, à signaler avant l'export final.
    /// Consultatif, jamais bloquant.
    pub fn needs_warning(&self) -> bool {
        self.produits_sans_nouvelle_justification > 0
    }
}

/// Compare les suggestions courantes à leur référence machine
///
/// Comparaison par index. Une suggestion courante sans homologue d'origine
/// (référence plus courte) n'a pas de base de comparaison : elle n'est
/// jamais comptée, ce n'est pas une erreur.
pub fn evaluer_drift(
    original: &SuggestionsGenerees,
    courantes: &[Suggestion],
    synthese_courante: Option<&str>,
) -> EtatModifications {
    let mut produits_modifies = 0;
    let mut justifications_modifiees = false;
    let mut produits_sans_nouvelle_justification = 0;

    for (index, courante) in courantes.iter().enumerate() {
        let Some(reference) = original.suggestions.get(index) else {
            continue;
        };

        let produit_change = courante.produit_propose != reference.produit_propose;
        let justification_changee = courante.justification != reference.justification;

        if produit_change {
            produits_modifies += 1;
            if !justification_changee {
                produits_sans_nouvelle_justification += 1;
            }
        }
        if justification_changee {
            justifications_modifiees = true;
        }
    }

    let synthese_modifiee = synthese_courante
        .map(|texte| texte != original.synthese.texte)
        .unwrap_or(false);

    EtatModifications {
        produits_modifies,
        justifications_modifiees,
        synthese_modifiee,
        produits_sans_nouvelle_justification,
    }
}
