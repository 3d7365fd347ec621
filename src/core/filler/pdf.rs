use std::collections::HashMap;

use lopdf::{Dictionary, Document, Object, ObjectId};
use serde_json::{Map, Value};
use tracing::warn;

use crate::core::filler::{valeur_en_texte, FillOutcome, Filler, FillerError};
use crate::models::PdfConfig;

/// Moteur de remplissage des formulaires PDF
///
/// Restreint aux PDF à formulaire interactif (AcroForm) : un PDF sans
/// formulaire ne peut pas être rempli et est rejeté immédiatement, jamais
/// recopié tel quel. Un champ mappé absent du formulaire est ignoré avec
/// un avertissement, comme pour les autres moteurs.
pub struct PdfFiller {
    config: PdfConfig,
}

impl PdfFiller {
    pub fn new(config: PdfConfig) -> Self {
        Self { config }
    }

    /// Résout l'ID d'objet de l'AcroForm depuis le catalogue
    fn acroform_id(document: &Document) -> Result<ObjectId, FillerError> {
        let catalogue = document
            .catalog()
            .map_err(|e| FillerError::Unsupported(format!("catalogue PDF illisible: {}", e)))?;

        let acroform = catalogue.get(b"AcroForm").map_err(|_| {
            FillerError::Unsupported(
                "PDF sans formulaire interactif, remplissage impossible".to_string(),
            )
        })?;

        match acroform {
            Object::Reference(id) => Ok(*id),
            _ => Err(FillerError::Unsupported(
                "AcroForm inline non supporté".to_string(),
            )),
        }
    }

    /// Recense les champs du formulaire : nom complet -> ID d'objet.
    /// Les champs hiérarchiques (Kids) sont parcourus, leurs noms joints
    /// par des points comme dans la spécification PDF.
    fn recenser_champs(
        document: &Document,
        acroform: &Dictionary,
    ) -> Result<HashMap<String, ObjectId>, FillerError> {
        let racines = acroform
            .get(b"Fields")
            .and_then(|objet| objet.as_array())
            .map_err(|_| {
                FillerError::Unsupported("formulaire PDF sans liste de champs".to_string())
            })?;

        let mut champs = HashMap::new();
        let mut pile: Vec<(ObjectId, String)> = racines
            .iter()
            .filter_map(|objet| objet.as_reference().ok())
            .map(|id| (id, String::new()))
            .collect();

        while let Some((id, prefixe)) = pile.pop() {
            let Ok(dictionnaire) = document.get_object(id).and_then(|o| o.as_dict()) else {
                continue;
            };

            let nom_partiel = dictionnaire
                .get(b"T")
                .and_then(|objet| objet.as_str())
                .map(|octets| String::from_utf8_lossy(octets).to_string())
                .unwrap_or_default();

            let nom_complet = if prefixe.is_empty() {
                nom_partiel
            } else if nom_partiel.is_empty() {
                prefixe.clone()
            } else {
                format!("{}.{}", prefixe, nom_partiel)
            };

            match dictionnaire.get(b"Kids").and_then(|objet| objet.as_array()) {
                Ok(enfants) => {
                    for enfant in enfants {
                        if let Ok(enfant_id) = enfant.as_reference() {
                            pile.push((enfant_id, nom_complet.clone()));
                        }
                    }
                }
                Err(_) => {
                    if !nom_complet.is_empty() {
                        champs.insert(nom_complet, id);
                    }
                }
            }
        }

        Ok(champs)
    }
}

impl Filler for PdfFiller {
    fn fill(
        &self,
        template: &[u8],
        donnees: &Map<String, Value>,
    ) -> Result<FillOutcome, FillerError> {
        let mut document = Document::load_mem(template)
            .map_err(|e| FillerError::Unsupported(format!("PDF illisible: {}", e)))?;

        let acroform_id = Self::acroform_id(&document)?;
        let acroform = document
            .get_object(acroform_id)
            .and_then(|objet| objet.as_dict())
            .map_err(|e| FillerError::Unsupported(format!("AcroForm illisible: {}", e)))?;

        let champs = Self::recenser_champs(&document, acroform)?;

        let mut avertissements = Vec::new();
        for (nom_champ, cle) in &self.config.champs {
            let Some(&id) = champs.get(nom_champ) else {
                // Champ mappé absent du formulaire : on saute cette seule
                // entrée, la génération continue.
                let message = format!("champ de formulaire absent ignoré: {}", nom_champ);
                warn!("{}", message);
                avertissements.push(message);
                continue;
            };

            let texte = valeur_en_texte(donnees.get(cle));
            let dictionnaire = document
                .get_object_mut(id)
                .and_then(|objet| objet.as_dict_mut())
                .map_err(|e| FillerError::Binaire(format!("champ {}: {}", nom_champ, e)))?;

            dictionnaire.set(b"V".to_vec(), Object::string_literal(texte));
            // L'apparence précédente ne correspond plus à la valeur
            dictionnaire.remove(b"AP");
        }

        // Les lecteurs doivent régénérer les apparences des champs
        let acroform = document
            .get_object_mut(acroform_id)
            .and_then(|objet| objet.as_dict_mut())
            .map_err(|e| FillerError::Binaire(e.to_string()))?;
        acroform.set(b"NeedAppearances".to_vec(), Object::Boolean(true));

        let mut contenu = Vec::new();
        document
            .save_to(&mut contenu)
            .map_err(|e| FillerError::Binaire(format!("écriture PDF: {}", e)))?;

        Ok(FillOutcome {
            contenu,
            avertissements,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;
    use std::collections::BTreeMap;

    /// Construit un PDF minimal avec un formulaire d'un champ texte par nom
    fn pdf_formulaire(noms_champs: &[&str]) -> Vec<u8> {
        let mut document = Document::with_version("1.5");

        let pages_id = document.new_object_id();

        let champ_ids: Vec<ObjectId> = noms_champs
            .iter()
            .map(|nom| {
                document.add_object(dictionary! {
                    "Type" => "Annot",
                    "Subtype" => "Widget",
                    "FT" => "Tx",
                    "T" => Object::string_literal(*nom),
                    "Rect" => vec![0.into(), 0.into(), 100.into(), 20.into()],
                })
            })
            .collect();

        let page_id = document.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Annots" => champ_ids.iter().map(|id| Object::Reference(*id)).collect::<Vec<_>>(),
        });

        document.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => 1,
            }),
        );

        let acroform_id = document.add_object(dictionary! {
            "Fields" => champ_ids.iter().map(|id| Object::Reference(*id)).collect::<Vec<_>>(),
        });

        let catalogue_id = document.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
            "AcroForm" => Object::Reference(acroform_id),
        });

        document.trailer.set("Root", catalogue_id);

        let mut contenu = Vec::new();
        document.save_to(&mut contenu).unwrap();
        contenu
    }

    /// PDF sans AcroForm
    fn pdf_sans_formulaire() -> Vec<u8> {
        let mut document = Document::with_version("1.5");

        let pages_id = document.new_object_id();
        let page_id = document.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
        });
        document.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => 1,
            }),
        );
        let catalogue_id = document.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        });
        document.trailer.set("Root", catalogue_id);

        let mut contenu = Vec::new();
        document.save_to(&mut contenu).unwrap();
        contenu
    }

    fn valeur_champ(contenu: &[u8], nom: &str) -> Option<String> {
        let document = Document::load_mem(contenu).unwrap();
        let acroform_id = PdfFiller::acroform_id(&document).unwrap();
        let acroform = document
            .get_object(acroform_id)
            .and_then(|o| o.as_dict())
            .unwrap();
        let champs = PdfFiller::recenser_champs(&document, acroform).unwrap();
        let id = champs.get(nom)?;
        let dictionnaire = document.get_object(*id).and_then(|o| o.as_dict()).ok()?;
        dictionnaire
            .get(b"V")
            .and_then(|o| o.as_str())
            .ok()
            .map(|octets| String::from_utf8_lossy(octets).to_string())
    }

    fn config(champs: &[(&str, &str)]) -> PdfConfig {
        PdfConfig {
            champs: champs
                .iter()
                .map(|(n, c)| (n.to_string(), c.to_string()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    fn donnees(json: serde_json::Value) -> Map<String, Value> {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn remplissage_et_relecture() {
        let gabarit = pdf_formulaire(&["nom_client", "total"]);
        let filler = PdfFiller::new(config(&[
            ("nom_client", "client_name"),
            ("total", "total"),
        ]));

        let resultat = filler
            .fill(&gabarit, &donnees(serde_json::json!({
                "client_name": "Acme",
                "total": 1500
            })))
            .unwrap();

        assert_eq!(valeur_champ(&resultat.contenu, "nom_client").as_deref(), Some("Acme"));
        assert_eq!(valeur_champ(&resultat.contenu, "total").as_deref(), Some("1500"));
        assert!(resultat.avertissements.is_empty());
    }

    #[test]
    fn champ_de_donnees_absent_ecrit_chaine_vide() {
        let gabarit = pdf_formulaire(&["nom_client"]);
        let filler = PdfFiller::new(config(&[("nom_client", "client_name")]));

        let resultat = filler.fill(&gabarit, &donnees(serde_json::json!({}))).unwrap();

        assert_eq!(valeur_champ(&resultat.contenu, "nom_client").as_deref(), Some(""));
    }

    #[test]
    fn champ_de_formulaire_inconnu_ignore_avec_avertissement() {
        let gabarit = pdf_formulaire(&["nom_client"]);
        let filler = PdfFiller::new(config(&[
            ("nom_client", "client_name"),
            ("inexistant", "autre"),
        ]));

        let resultat = filler
            .fill(&gabarit, &donnees(serde_json::json!({ "client_name": "Acme" })))
            .unwrap();

        assert_eq!(valeur_champ(&resultat.contenu, "nom_client").as_deref(), Some("Acme"));
        assert_eq!(resultat.avertissements.len(), 1);
        assert!(resultat.avertissements[0].contains("inexistant"));
    }

    #[test]
    fn pdf_sans_formulaire_rejete() {
        let gabarit = pdf_sans_formulaire();
        let filler = PdfFiller::new(config(&[("nom_client", "client_name")]));

        let erreur = filler
            .fill(&gabarit, &donnees(serde_json::json!({})))
            .unwrap_err();
        assert!(matches!(erreur, FillerError::Unsupported(_)));
    }

    #[test]
    fn need_appearances_active_apres_remplissage() {
        let gabarit = pdf_formulaire(&["nom_client"]);
        let filler = PdfFiller::new(config(&[("nom_client", "client_name")]));

        let resultat = filler
            .fill(&gabarit, &donnees(serde_json::json!({ "client_name": "Acme" })))
            .unwrap();

        let document = Document::load_mem(&resultat.contenu).unwrap();
        let acroform_id = PdfFiller::acroform_id(&document).unwrap();
        let acroform = document
            .get_object(acroform_id)
            .and_then(|o| o.as_dict())
            .unwrap();
        assert_eq!(
            acroform.get(b"NeedAppearances").and_then(|o| o.as_bool()).unwrap(),
            true
        );
    }
}
