use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};

/// Nombre maximum de templates par organisation
pub const TEMPLATES_MAX_PAR_ORGANISATION: i64 = 3;

/// Format de fichier d'un template
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "file_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    Excel,
    Word,
    Pdf,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Excel => "excel",
            FileType::Word => "word",
            FileType::Pdf => "pdf",
        }
    }

    /// Extension de fichier de l'artefact généré
    pub fn extension(&self) -> &'static str {
        match self {
            FileType::Excel => "xlsx",
            FileType::Word => "docx",
            FileType::Pdf => "pdf",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            FileType::Excel => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            FileType::Word => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            FileType::Pdf => "application/pdf",
        }
    }
}

/// État d'un template
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "statut_template", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum StatutTemplate {
    Brouillon,   // Créé, jamais testé
    Teste,       // Un remplissage d'essai a réussi
    Actif,       // Utilisable en génération
}

/// Délimiteurs de placeholders d'un template Word
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Delimiteurs {
    pub ouvrant: String,
    pub fermant: String,
}

impl Default for Delimiteurs {
    fn default() -> Self {
        Self {
            ouvrant: "{{".to_string(),
            fermant: "}}".to_string(),
        }
    }
}

/// Substitution de tableau dynamique (template Word)
///
/// `marqueur` est un placeholder dont la valeur associée est un tableau :
/// chaque élément produit une ligne.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableauDynamique {
    pub marqueur: String,
    pub champ: String,
}

/// Configuration de remplissage Excel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExcelConfig {
    /// Nom de la feuille cible
    pub feuille: String,

    /// Adresse de cellule -> clé logique de champ
    pub cellules: BTreeMap<String, String>,

    /// Cellules dont la formule est préservée, jamais écrasées
    #[serde(default)]
    pub cellules_formules: BTreeSet<String>,
}

/// Configuration de remplissage Word
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WordConfig {
    /// Style de délimiteurs, par défaut `{{ }}`
    #[serde(default)]
    pub delimiteurs: Delimiteurs,

    /// Placeholder -> clé logique de champ
    pub champs: BTreeMap<String, String>,

    /// Substitutions de tableaux dynamiques
    #[serde(default)]
    pub tableaux: Vec<TableauDynamique>,
}

/// Configuration de remplissage PDF
///
/// Restreint aux PDF à formulaire interactif. Un PDF sans formulaire est
/// rejeté au test du template, pas silencieusement recopié.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PdfConfig {
    /// Nom de champ de formulaire -> clé logique de champ
    pub champs: BTreeMap<String, String>,
}

/// Configuration de remplissage, discriminée par le format
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FileConfig {
    Excel(ExcelConfig),
    Word(WordConfig),
    Pdf(PdfConfig),
}

impl FileConfig {
    /// Format correspondant au discriminant
    pub fn file_type(&self) -> FileType {
        match self {
            FileConfig::Excel(_) => FileType::Excel,
            FileConfig::Word(_) => FileType::Word,
            FileConfig::Pdf(_) => FileType::Pdf,
        }
    }

    /// Vrai si la configuration correspond au format déclaré du template
    pub fn correspond(&self, file_type: FileType) -> bool {
        self.file_type() == file_type
    }

    /// Clés logiques référencées par la configuration
    pub fn cles_champs(&self) -> Vec<&str> {
        match self {
            FileConfig::Excel(c) => c.cellules.values().map(|s| s.as_str()).collect(),
            FileConfig::Word(c) => c.champs.values().map(|s| s.as_str()).collect(),
            FileConfig::Pdf(c) => c.champs.values().map(|s| s.as_str()).collect(),
        }
    }
}

/// Un template de proposition
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PropositionTemplate {
    /// ID unique
    pub id: Uuid,

    /// Organisation propriétaire, None = template global importable
    pub organisation_id: Option<Uuid>,

    /// Nom du template
    pub nom: String,

    /// Format déclaré
    pub file_type: FileType,

    /// Configuration de remplissage (doit correspondre à `file_type`)
    pub file_config: sqlx::types::Json<FileConfig>,

    /// État du template
    pub statut: StatutTemplate,

    /// Emplacement du binaire dans le stockage
    pub fichier_url: String,

    /// Date de création
    pub created_at: DateTime<Utc>,

    /// Date de mise à jour
    pub updated_at: DateTime<Utc>,
}

impl PropositionTemplate {
    pub fn new(
        organisation_id: Option<Uuid>,
        nom: String,
        file_type: FileType,
        file_config: FileConfig,
        fichier_url: String,
    ) -> Self {
        let now = Utc::now();

        Self {
            id: Uuid::new_v4(),
            organisation_id,
            nom,
            file_type,
            file_config: sqlx::types::Json(file_config),
            statut: StatutTemplate::Brouillon,
            fichier_url,
            created_at: now,
            updated_at: now,
        }
    }

    /// Vrai si le template est importable par n'importe quelle organisation
    pub fn est_global(&self) -> bool {
        self.organisation_id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_excel_correspond_au_format() {
        let config = FileConfig::Excel(ExcelConfig {
            feuille: "Devis".to_string(),
            cellules: BTreeMap::from([("B2".to_string(), "client_name".to_string())]),
            cellules_formules: BTreeSet::new(),
        });

        assert!(config.correspond(FileType::Excel));
        assert!(!config.correspond(FileType::Word));
        assert!(!config.correspond(FileType::Pdf));
    }

    #[test]
    fn config_serialisee_avec_discriminant() {
        let config = FileConfig::Pdf(PdfConfig {
            champs: BTreeMap::from([("nom_client".to_string(), "client_name".to_string())]),
        });

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["type"], "pdf");

        let relue: FileConfig = serde_json::from_value(json).unwrap();
        assert_eq!(relue, config);
    }

    #[test]
    fn delimiteurs_par_defaut() {
        let config: WordConfig = serde_json::from_value(serde_json::json!({
            "champs": { "client": "client_name" }
        }))
        .unwrap();

        assert_eq!(config.delimiteurs.ouvrant, "{{");
        assert_eq!(config.delimiteurs.fermant, "}}");
    }
}
