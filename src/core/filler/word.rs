use std::collections::HashSet;
use std::io::{Cursor, Read, Write};

use regex::Regex;
use serde_json::{Map, Value};
use tracing::warn;
use zip::write::SimpleFileOptions;

use crate::core::filler::{valeur_en_texte, FillOutcome, Filler, FillerError};
use crate::models::WordConfig;

const DOCUMENT_XML: &str = "word/document.xml";

/// Moteur de remplissage des documents Word
///
/// Substitue toutes les occurrences de chaque placeholder configuré dans
/// `word/document.xml` en une seule passe de rendu (`replace_all` avec
/// closure), jamais par remplacements successifs : les placeholders répétés
/// et les valeurs contenant elles-mêmes des délimiteurs ne produisent pas
/// de re-correspondances partielles. Les autres entrées de l'archive sont
/// recopiées telles quelles.
pub struct WordFiller {
    config: WordConfig,
}

impl WordFiller {
    pub fn new(config: WordConfig) -> Self {
        Self { config }
    }

    /// Texte de substitution pour un placeholder, ou None s'il n'est pas
    /// configuré (il reste alors tel quel dans le document)
    fn substitution(&self, nom: &str, donnees: &Map<String, Value>) -> Option<String> {
        if let Some(cle) = self.config.champs.get(nom) {
            return Some(texte_xml(&valeur_en_texte(donnees.get(cle))));
        }

        // Tableau dynamique : la valeur est un tableau, un élément par ligne
        if let Some(tableau) = self.config.tableaux.iter().find(|t| t.marqueur == nom) {
            let lignes: Vec<String> = match donnees.get(&tableau.champ) {
                Some(Value::Array(elements)) => elements
                    .iter()
                    .map(|e| texte_xml(&valeur_en_texte(Some(e))))
                    .collect(),
                autre => vec![texte_xml(&valeur_en_texte(autre))],
            };
            // Saut de ligne au sein du run : </w:t><w:br/><w:t>
            return Some(lignes.join("</w:t><w:br/><w:t>"));
        }

        None
    }
}

impl Filler for WordFiller {
    fn fill(
        &self,
        template: &[u8],
        donnees: &Map<String, Value>,
    ) -> Result<FillOutcome, FillerError> {
        let mut archive = zip::ZipArchive::new(Cursor::new(template))
            .map_err(|e| FillerError::Unsupported(format!("archive .docx illisible: {}", e)))?;

        let mut document_xml = String::new();
        archive
            .by_name(DOCUMENT_XML)
            .map_err(|_| {
                FillerError::Unsupported("word/document.xml absent, pas un .docx".to_string())
            })?
            .read_to_string(&mut document_xml)
            .map_err(|e| FillerError::Binaire(e.to_string()))?;

        // Une seule expression pour tous les placeholders délimités
        let motif = format!(
            r"{}\s*([A-Za-z0-9_.\-]+)\s*{}",
            regex::escape(&self.config.delimiteurs.ouvrant),
            regex::escape(&self.config.delimiteurs.fermant),
        );
        let re = Regex::new(&motif).map_err(|e| FillerError::Binaire(e.to_string()))?;

        let mut rencontres: HashSet<String> = HashSet::new();
        let substitue = re.replace_all(&document_xml, |caps: &regex::Captures| {
            let nom = &caps[1];
            rencontres.insert(nom.to_string());
            match self.substitution(nom, donnees) {
                Some(texte) => texte,
                // Placeholder présent dans le document mais absent de la
                // configuration : laissé intact.
                None => caps[0].to_string(),
            }
        });

        // Dérive gabarit/config : placeholders configurés introuvables
        let mut avertissements = Vec::new();
        for nom in self.config.champs.keys() {
            if !rencontres.contains(nom) {
                let message = format!("placeholder absent du gabarit ignoré: {}", nom);
                warn!("{}", message);
                avertissements.push(message);
            }
        }

        // Réassemblage : document.xml réécrit, le reste recopié tel quel
        let mut sortie = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for index in 0..archive.len() {
            let entree = archive
                .by_index_raw(index)
                .map_err(|e| FillerError::Binaire(e.to_string()))?;

            if entree.name() == DOCUMENT_XML {
                sortie
                    .start_file(DOCUMENT_XML, SimpleFileOptions::default())
                    .map_err(|e| FillerError::Binaire(e.to_string()))?;
                sortie
                    .write_all(substitue.as_bytes())
                    .map_err(|e| FillerError::Binaire(e.to_string()))?;
            } else {
                sortie
                    .raw_copy_file(entree)
                    .map_err(|e| FillerError::Binaire(e.to_string()))?;
            }
        }

        let contenu = sortie
            .finish()
            .map_err(|e| FillerError::Binaire(e.to_string()))?
            .into_inner();

        Ok(FillOutcome {
            contenu,
            avertissements,
        })
    }
}

/// Échappement XML minimal des valeurs injectées
fn texte_xml(texte: &str) -> String {
    texte
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Delimiteurs, TableauDynamique};
    use std::collections::BTreeMap;

    fn docx(corps: &str) -> Vec<u8> {
        let mut archive = zip::ZipWriter::new(Cursor::new(Vec::new()));

        archive
            .start_file("[Content_Types].xml", SimpleFileOptions::default())
            .unwrap();
        archive
            .write_all(br#"<?xml version="1.0"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"/>"#)
            .unwrap();

        archive
            .start_file(DOCUMENT_XML, SimpleFileOptions::default())
            .unwrap();
        archive
            .write_all(
                format!(
                    r#"<?xml version="1.0"?><w:document><w:body>{}</w:body></w:document>"#,
                    corps
                )
                .as_bytes(),
            )
            .unwrap();

        archive.finish().unwrap().into_inner()
    }

    fn contenu_document(docx: &[u8]) -> String {
        let mut archive = zip::ZipArchive::new(Cursor::new(docx)).unwrap();
        let mut texte = String::new();
        archive
            .by_name(DOCUMENT_XML)
            .unwrap()
            .read_to_string(&mut texte)
            .unwrap();
        texte
    }

    fn config(champs: &[(&str, &str)]) -> WordConfig {
        WordConfig {
            delimiteurs: Delimiteurs::default(),
            champs: champs
                .iter()
                .map(|(p, c)| (p.to_string(), c.to_string()))
                .collect::<BTreeMap<_, _>>(),
            tableaux: Vec::new(),
        }
    }

    fn donnees(json: serde_json::Value) -> Map<String, Value> {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn substitution_simple_et_relecture() {
        let gabarit = docx("<w:p><w:r><w:t>Bonjour {{client}}, total {{total}}</w:t></w:r></w:p>");
        let filler = WordFiller::new(config(&[("client", "client_name"), ("total", "total")]));

        let resultat = filler
            .fill(&gabarit, &donnees(serde_json::json!({
                "client_name": "Acme",
                "total": 990
            })))
            .unwrap();

        let texte = contenu_document(&resultat.contenu);
        assert!(texte.contains("Bonjour Acme, total 990"));
        assert!(resultat.avertissements.is_empty());
    }

    #[test]
    fn placeholders_repetes_tous_substitues() {
        let gabarit = docx("<w:p><w:r><w:t>{{client}} et encore {{client}}</w:t></w:r></w:p>");
        let filler = WordFiller::new(config(&[("client", "client_name")]));

        let resultat = filler
            .fill(&gabarit, &donnees(serde_json::json!({ "client_name": "Acme" })))
            .unwrap();

        let texte = contenu_document(&resultat.contenu);
        assert!(texte.contains("Acme et encore Acme"));
        assert!(!texte.contains("{{client}}"));
    }

    #[test]
    fn passe_unique_sans_re_correspondance() {
        // La valeur injectée contient elle-même un placeholder : une passe
        // unique ne doit pas la re-substituer.
        let gabarit = docx("<w:p><w:r><w:t>{{a}} {{b}}</w:t></w:r></w:p>");
        let filler = WordFiller::new(config(&[("a", "a"), ("b", "b")]));

        let resultat = filler
            .fill(&gabarit, &donnees(serde_json::json!({
                "a": "{{b}}",
                "b": "beta"
            })))
            .unwrap();

        let texte = contenu_document(&resultat.contenu);
        assert!(texte.contains("{{b}} beta"));
    }

    #[test]
    fn champ_absent_substitue_en_chaine_vide() {
        let gabarit = docx("<w:p><w:r><w:t>[{{client}}]</w:t></w:r></w:p>");
        let filler = WordFiller::new(config(&[("client", "client_name")]));

        let resultat = filler.fill(&gabarit, &donnees(serde_json::json!({}))).unwrap();

        assert!(contenu_document(&resultat.contenu).contains("[]"));
    }

    #[test]
    fn placeholder_configure_absent_du_gabarit_signale() {
        let gabarit = docx("<w:p><w:r><w:t>{{client}}</w:t></w:r></w:p>");
        let filler = WordFiller::new(config(&[("client", "client_name"), ("fantome", "x")]));

        let resultat = filler
            .fill(&gabarit, &donnees(serde_json::json!({ "client_name": "Acme" })))
            .unwrap();

        assert_eq!(resultat.avertissements.len(), 1);
        assert!(resultat.avertissements[0].contains("fantome"));
    }

    #[test]
    fn placeholder_non_configure_laisse_intact() {
        let gabarit = docx("<w:p><w:r><w:t>{{client}} {{libre}}</w:t></w:r></w:p>");
        let filler = WordFiller::new(config(&[("client", "client_name")]));

        let resultat = filler
            .fill(&gabarit, &donnees(serde_json::json!({ "client_name": "Acme" })))
            .unwrap();

        let texte = contenu_document(&resultat.contenu);
        assert!(texte.contains("Acme {{libre}}"));
    }

    #[test]
    fn valeurs_echappees_pour_xml() {
        let gabarit = docx("<w:p><w:r><w:t>{{client}}</w:t></w:r></w:p>");
        let filler = WordFiller::new(config(&[("client", "client_name")]));

        let resultat = filler
            .fill(&gabarit, &donnees(serde_json::json!({ "client_name": "A&B <SARL>" })))
            .unwrap();

        let texte = contenu_document(&resultat.contenu);
        assert!(texte.contains("A&amp;B &lt;SARL&gt;"));
    }

    #[test]
    fn tableau_dynamique_une_ligne_par_element() {
        let gabarit = docx("<w:p><w:r><w:t>{{lignes}}</w:t></w:r></w:p>");
        let mut config = config(&[]);
        config.tableaux.push(TableauDynamique {
            marqueur: "lignes".to_string(),
            champ: "produits".to_string(),
        });
        let filler = WordFiller::new(config);

        let resultat = filler
            .fill(&gabarit, &donnees(serde_json::json!({
                "produits": ["Offre A", "Offre B"]
            })))
            .unwrap();

        let texte = contenu_document(&resultat.contenu);
        assert!(texte.contains("Offre A</w:t><w:br/><w:t>Offre B"));
    }

    #[test]
    fn archive_sans_document_xml_rejetee() {
        let mut archive = zip::ZipWriter::new(Cursor::new(Vec::new()));
        archive
            .start_file("autre.txt", SimpleFileOptions::default())
            .unwrap();
        archive.write_all(b"pas un docx").unwrap();
        let binaire = archive.finish().unwrap().into_inner();

        let filler = WordFiller::new(config(&[("client", "client_name")]));
        let erreur = filler
            .fill(&binaire, &donnees(serde_json::json!({})))
            .unwrap_err();
        assert!(matches!(erreur, FillerError::Unsupported(_)));
    }
}
