pub mod excel;
pub mod pdf;
pub mod word;

pub use excel::ExcelFiller;
pub use pdf::PdfFiller;
pub use word::WordFiller;

use serde_json::{Map, Value};

use crate::models::FileConfig;
use crate::utils::error::AppError;

/// Résultat d'un remplissage : le binaire produit et les entrées de mapping
/// ignorées (cible absente du gabarit)
#[derive(Debug, Clone)]
pub struct FillOutcome {
    pub contenu: Vec<u8>,
    pub avertissements: Vec<String>,
}

/// Erreurs des moteurs de remplissage
#[derive(Debug, thiserror::Error)]
pub enum FillerError {
    #[error("Structure de gabarit invalide: {0}")]
    Structure(String),
    #[error("Gabarit non supporté: {0}")]
    Unsupported(String),
    #[error("Erreur de lecture/écriture du gabarit: {0}")]
    Binaire(String),
}

impl From<FillerError> for AppError {
    fn from(error: FillerError) -> Self {
        match error {
            FillerError::Structure(msg) => AppError::TemplateStructure(msg),
            FillerError::Unsupported(msg) => AppError::UnsupportedTemplate(msg),
            FillerError::Binaire(msg) => AppError::Generation {
                message: "Le gabarit n'a pas pu être rempli".to_string(),
                details: msg,
            },
        }
    }
}

/// Moteur de remplissage d'un format documentaire
///
/// Transformation pure : le gabarit d'entrée est immuable et aucun moteur
/// n'écrit dans le stockage. La persistance du binaire produit appartient
/// à l'appelant.
pub trait Filler {
    fn fill(&self, template: &[u8], donnees: &Map<String, Value>)
        -> Result<FillOutcome, FillerError>;
}

/// Sélectionne le moteur correspondant à la configuration
pub fn filler_pour(config: &FileConfig) -> Box<dyn Filler + Send + Sync> {
    match config {
        FileConfig::Excel(c) => Box::new(ExcelFiller::new(c.clone())),
        FileConfig::Word(c) => Box::new(WordFiller::new(c.clone())),
        FileConfig::Pdf(c) => Box::new(PdfFiller::new(c.clone())),
    }
}

/// Valeur textuelle d'un champ : chaîne vide pour absent/null, jamais
/// une erreur — une proposition partielle est un cas nominal
pub(crate) fn valeur_en_texte(valeur: Option<&Value>) -> String {
    match valeur {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(autre) => autre.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn champ_absent_ou_null_donne_chaine_vide() {
        let donnees: Map<String, Value> =
            serde_json::from_value(json!({ "present": "x", "nul": null })).unwrap();

        assert_eq!(valeur_en_texte(donnees.get("absent")), "");
        assert_eq!(valeur_en_texte(donnees.get("nul")), "");
        assert_eq!(valeur_en_texte(donnees.get("present")), "x");
    }

    #[test]
    fn valeurs_non_textuelles_stringifiees() {
        let donnees: Map<String, Value> =
            serde_json::from_value(json!({ "n": 42.5, "b": true, "liste": [1, 2] })).unwrap();

        assert_eq!(valeur_en_texte(donnees.get("n")), "42.5");
        assert_eq!(valeur_en_texte(donnees.get("b")), "true");
        assert_eq!(valeur_en_texte(donnees.get("liste")), "[1,2]");
    }
}
