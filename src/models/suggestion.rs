use serde::{Deserialize, Serialize};
use rust_decimal::Decimal;

/// Une substitution de produit proposée au client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Suggestion {
    /// Ligne actuelle du client (produit en place)
    pub ligne_actuelle: String,

    /// Produit de remplacement proposé
    pub produit_propose: String,

    /// Prix actuel
    pub prix_actuel: Decimal,

    /// Prix proposé
    pub prix_propose: Decimal,

    /// Économie mensuelle calculée
    pub economie_mensuelle: Decimal,

    /// Justification libre du remplacement
    pub justification: String,
}

/// Synthèse d'un lot de suggestions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Synthese {
    /// Économie totale agrégée
    pub economie_totale: Decimal,

    /// Points d'amélioration
    pub ameliorations: Vec<String>,

    /// Texte de synthèse
    pub texte: String,
}

/// Lot de suggestions généré par l'IA, conservé comme référence
/// pour la détection de dérive après édition humaine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SuggestionsGenerees {
    pub suggestions: Vec<Suggestion>,
    pub synthese: Synthese,
}
