//! Group documents by the configured `[[catalog]]` taxonomy.
//!
//! A document is placed by its `category`: under the subcategory with that
//! exact name, or directly under a top-level entry without subcategories
//! whose title matches. Empty groups are left out and anything unplaced
//! lands in a trailing [`UNCATEGORIZED`] group.

use serde::Serialize;

use crate::config::CatalogEntry;
use crate::models::Document;

pub const UNCATEGORIZED: &str = "Uncategorized";

#[derive(Debug, Clone, Serialize)]
pub struct CatalogGroup {
    pub title: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub subcategories: Vec<SubcategoryGroup>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub documents: Vec<Document>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubcategoryGroup {
    pub name: String,
    pub documents: Vec<Document>,
}

impl CatalogGroup {
    pub fn document_count(&self) -> usize {
        self.documents.len()
            + self
                .subcategories
                .iter()
                .map(|s| s.documents.len())
                .sum::<usize>()
    }
}

/// Group `documents`, preserving their order inside each group.
pub fn group_documents(catalog: &[CatalogEntry], documents: &[Document]) -> Vec<CatalogGroup> {
    let mut placed = vec![false; documents.len()];
    let mut groups = Vec::new();

    for entry in catalog {
        let group = if entry.subcategories.is_empty() {
            CatalogGroup {
                title: entry.title.clone(),
                subcategories: Vec::new(),
                documents: take_matching(documents, &mut placed, &entry.title),
            }
        } else {
            let subcategories = entry
                .subcategories
                .iter()
                .map(|name| SubcategoryGroup {
                    name: name.clone(),
                    documents: take_matching(documents, &mut placed, name),
                })
                .filter(|sub| !sub.documents.is_empty())
                .collect();
            CatalogGroup {
                title: entry.title.clone(),
                subcategories,
                documents: Vec::new(),
            }
        };

        if group.document_count() > 0 {
            groups.push(group);
        }
    }

    let rest: Vec<Document> = documents
        .iter()
        .zip(placed.iter())
        .filter(|(_, done)| !**done)
        .map(|(doc, _)| doc.clone())
        .collect();
    if !rest.is_empty() {
        groups.push(CatalogGroup {
            title: UNCATEGORIZED.to_string(),
            subcategories: Vec::new(),
            documents: rest,
        });
    }

    groups
}

fn take_matching(documents: &[Document], placed: &mut [bool], category: &str) -> Vec<Document> {
    let mut matched = Vec::new();
    for (doc, done) in documents.iter().zip(placed.iter_mut()) {
        if !*done && doc.category.as_deref() == Some(category) {
            *done = true;
            matched.push(doc.clone());
        }
    }
    matched
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn doc(name: &str, category: Option<&str>) -> Document {
        Document {
            id: format!("id-{}", name),
            name: name.to_string(),
            file_path: format!("{}.pdf", name),
            file_type: "application/pdf".to_string(),
            file_size: 10,
            enabled: true,
            category: category.map(|c| c.to_string()),
            processed: false,
            content: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn catalog() -> Vec<CatalogEntry> {
        vec![
            CatalogEntry {
                title: "Association".to_string(),
                subcategories: vec!["Bylaws".to_string(), "Minutes".to_string()],
            },
            CatalogEntry {
                title: "Parking".to_string(),
                subcategories: Vec::new(),
            },
            CatalogEntry {
                title: "Privacy".to_string(),
                subcategories: Vec::new(),
            },
        ]
    }

    #[test]
    fn test_groups_by_subcategory_and_title() {
        let docs = vec![
            doc("bylaws-2024", Some("Bylaws")),
            doc("parking-rules", Some("Parking")),
            doc("minutes-jan", Some("Minutes")),
            doc("bylaws-2020", Some("Bylaws")),
        ];
        let groups = group_documents(&catalog(), &docs);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].title, "Association");
        assert_eq!(groups[0].subcategories.len(), 2);
        assert_eq!(groups[0].subcategories[0].name, "Bylaws");
        let bylaws: Vec<&str> = groups[0].subcategories[0]
            .documents
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(bylaws, vec!["bylaws-2024", "bylaws-2020"]);
        assert_eq!(groups[1].title, "Parking");
        assert_eq!(groups[1].document_count(), 1);
    }

    #[test]
    fn test_empty_groups_omitted() {
        let groups = group_documents(&catalog(), &[doc("p", Some("Privacy"))]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].title, "Privacy");
    }

    #[test]
    fn test_unmatched_go_to_trailing_group() {
        let docs = vec![
            doc("loose", None),
            doc("odd", Some("Association")),
            doc("minutes", Some("Minutes")),
        ];
        let groups = group_documents(&catalog(), &docs);
        assert_eq!(groups.len(), 2);
        let last = groups.last().unwrap();
        assert_eq!(last.title, UNCATEGORIZED);
        let names: Vec<&str> = last.documents.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["loose", "odd"]);
    }

    #[test]
    fn test_no_documents_no_groups() {
        assert!(group_documents(&catalog(), &[]).is_empty());
    }
}
