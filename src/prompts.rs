//! The extraction prompt sent alongside every image.
//!
//! The JSON keys requested here (`customerName`, `customerAddress`,
//! `customerPhone`, `items[{description, quantity, unitPrice, details}]`,
//! `deliveryTime`, `extractedText`) are exactly the keys read by
//! [`crate::pipeline::normalize`]. Change both sides together.
//!
//! Callers can override the prompt via
//! [`crate::config::ExtractionConfig::prompt`]; the constant here is used only
//! when no override is provided.

/// Default extraction prompt (French, pure-JSON answer requested).
pub const EXTRACTION_PROMPT: &str = r#"Analyse cette image et extrait TOUTES les informations de commande ou de facture.

Recherche et extrait:
- Nom complet du client
- Adresse complète (rue, code postal, ville)
- Numéro de téléphone (si présent)
- Articles commandés avec détails (nom, quantité, couleurs, spécifications)
- Prix unitaire de chaque article
- Prix total
- Délai ou date de livraison
- Toute autre information pertinente pour une facture

IMPORTANT: Retourne ta réponse UNIQUEMENT en format JSON, sans markdown ni commentaires.
Format attendu:
{
  "customerName": "nom complet du client",
  "customerAddress": "adresse complète",
  "customerPhone": "téléphone ou N/A si absent",
  "items": [
    {
      "description": "description complète de l'article",
      "quantity": nombre_entier,
      "unitPrice": prix_en_euros,
      "details": "couleur, taille, ou autres détails"
    }
  ],
  "deliveryTime": "délai de livraison",
  "extractedText": "tout le texte brut que tu as lu dans l'image"
}

Sois précis et rigoureux dans l'extraction."#;
