use std::io::Cursor;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::warn;

use crate::core::filler::{valeur_en_texte, FillOutcome, Filler, FillerError};
use crate::models::ExcelConfig;

/// Moteur de remplissage des classeurs Excel
///
/// Écrit chaque valeur mappée dans sa cellule cible en préservant styles et
/// formules existants. Une cellule absente du gabarit est ignorée avec un
/// avertissement ; une feuille absente est fatale.
pub struct ExcelFiller {
    config: ExcelConfig,
}

impl ExcelFiller {
    pub fn new(config: ExcelConfig) -> Self {
        Self { config }
    }
}

impl Filler for ExcelFiller {
    fn fill(
        &self,
        template: &[u8],
        donnees: &Map<String, Value>,
    ) -> Result<FillOutcome, FillerError> {
        let mut classeur = umya_spreadsheet::reader::xlsx::read_reader(Cursor::new(template), true)
            .map_err(|e| FillerError::Unsupported(format!("classeur xlsx illisible: {}", e)))?;

        let feuille = classeur
            .get_sheet_by_name_mut(&self.config.feuille)
            .ok_or_else(|| {
                FillerError::Structure(format!("feuille absente: {}", self.config.feuille))
            })?;

        let mut avertissements = Vec::new();

        // A1, BC23 : lettres de colonne puis numéro de ligne
        let motif_adresse = Regex::new(r"^[A-Z]{1,3}[1-9][0-9]*$")
            .map_err(|e| FillerError::Binaire(e.to_string()))?;

        for (adresse, cle) in &self.config.cellules {
            // Les cellules à formule préservée ne sont jamais écrasées,
            // même si le mapping les cible.
            if self.config.cellules_formules.contains(adresse) {
                continue;
            }

            if !motif_adresse.is_match(adresse) {
                let message = format!("adresse de cellule invalide ignorée: {}", adresse);
                warn!("{}", message);
                avertissements.push(message);
                continue;
            }

            // Dérive gabarit/config : la cellule n'existe plus dans le
            // gabarit, on saute cette seule entrée.
            if feuille.get_cell(adresse.as_str()).is_none() {
                let message = format!("cellule absente du gabarit ignorée: {}", adresse);
                warn!("{}", message);
                avertissements.push(message);
                continue;
            }

            let texte = valeur_en_texte(donnees.get(cle));
            feuille.get_cell_mut(adresse.as_str()).set_value(texte);
        }

        let mut sortie = Cursor::new(Vec::new());
        umya_spreadsheet::writer::xlsx::write_writer(&classeur, &mut sortie)
            .map_err(|e| FillerError::Binaire(format!("écriture xlsx: {}", e)))?;

        Ok(FillOutcome {
            contenu: sortie.into_inner(),
            avertissements,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet};

    fn gabarit(cellules: &[(&str, &str)], formules: &[(&str, &str)]) -> Vec<u8> {
        let mut classeur = umya_spreadsheet::new_file();
        let feuille = classeur.get_sheet_by_name_mut("Sheet1").unwrap();

        for (adresse, valeur) in cellules {
            feuille.get_cell_mut(*adresse).set_value(valeur.to_string());
        }
        for (adresse, formule) in formules {
            feuille.get_cell_mut(*adresse).set_formula(formule.to_string());
        }

        let mut sortie = Cursor::new(Vec::new());
        umya_spreadsheet::writer::xlsx::write_writer(&classeur, &mut sortie).unwrap();
        sortie.into_inner()
    }

    fn donnees(json: serde_json::Value) -> Map<String, Value> {
        serde_json::from_value(json).unwrap()
    }

    fn config(cellules: &[(&str, &str)], formules: &[&str]) -> ExcelConfig {
        ExcelConfig {
            feuille: "Sheet1".to_string(),
            cellules: cellules
                .iter()
                .map(|(a, c)| (a.to_string(), c.to_string()))
                .collect::<BTreeMap<_, _>>(),
            cellules_formules: formules.iter().map(|a| a.to_string()).collect::<BTreeSet<_>>(),
        }
    }

    fn valeur_cellule(contenu: &[u8], adresse: &str) -> String {
        let classeur =
            umya_spreadsheet::reader::xlsx::read_reader(Cursor::new(contenu), true).unwrap();
        classeur
            .get_sheet_by_name("Sheet1")
            .unwrap()
            .get_value(adresse)
    }

    #[test]
    fn remplissage_et_relecture() {
        let gabarit = gabarit(&[("B2", "<client>"), ("C5", "<total>")], &[]);
        let filler = ExcelFiller::new(config(&[("B2", "client_name"), ("C5", "total")], &[]));

        let resultat = filler
            .fill(&gabarit, &donnees(serde_json::json!({
                "client_name": "Acme",
                "total": 1250
            })))
            .unwrap();

        assert_eq!(valeur_cellule(&resultat.contenu, "B2"), "Acme");
        assert_eq!(valeur_cellule(&resultat.contenu, "C5"), "1250");
        assert!(resultat.avertissements.is_empty());
    }

    #[test]
    fn champ_manquant_ecrit_chaine_vide() {
        let gabarit = gabarit(&[("B2", "ancienne valeur")], &[]);
        let filler = ExcelFiller::new(config(&[("B2", "client_name")], &[]));

        let resultat = filler.fill(&gabarit, &donnees(serde_json::json!({}))).unwrap();

        assert_eq!(valeur_cellule(&resultat.contenu, "B2"), "");
        assert!(resultat.avertissements.is_empty());
    }

    #[test]
    fn cellule_inconnue_ignoree_avec_avertissement() {
        let gabarit = gabarit(&[("B2", "<client>")], &[]);
        let filler = ExcelFiller::new(config(
            &[("B2", "client_name"), ("Z99", "unused")],
            &[],
        ));

        let resultat = filler
            .fill(&gabarit, &donnees(serde_json::json!({ "client_name": "Acme" })))
            .unwrap();

        // La génération aboutit, B2 est correcte, Z99 signalée
        assert_eq!(valeur_cellule(&resultat.contenu, "B2"), "Acme");
        assert_eq!(resultat.avertissements.len(), 1);
        assert!(resultat.avertissements[0].contains("Z99"));
    }

    #[test]
    fn cellule_a_formule_preservee_jamais_ecrasee() {
        let gabarit = gabarit(&[("B2", "<client>")], &[("C3", "SUM(A1:A2)")]);
        let filler = ExcelFiller::new(config(
            &[("B2", "client_name"), ("C3", "total")],
            &["C3"],
        ));

        let resultat = filler
            .fill(&gabarit, &donnees(serde_json::json!({
                "client_name": "Acme",
                "total": 99
            })))
            .unwrap();

        let classeur =
            umya_spreadsheet::reader::xlsx::read_reader(Cursor::new(&resultat.contenu[..]), true)
                .unwrap();
        let feuille = classeur.get_sheet_by_name("Sheet1").unwrap();
        assert_eq!(feuille.get_cell("C3").unwrap().get_formula(), "SUM(A1:A2)");
        assert_eq!(valeur_cellule(&resultat.contenu, "B2"), "Acme");
    }

    #[test]
    fn feuille_absente_fatale() {
        let gabarit = gabarit(&[("B2", "<client>")], &[]);
        let mut config = config(&[("B2", "client_name")], &[]);
        config.feuille = "Devis".to_string();
        let filler = ExcelFiller::new(config);

        let erreur = filler
            .fill(&gabarit, &donnees(serde_json::json!({})))
            .unwrap_err();
        assert!(matches!(erreur, FillerError::Structure(_)));
    }
}
