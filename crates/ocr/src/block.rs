//! Provider-agnostic block model and the block-to-`ExtractionResult`
//! transform. Kept separate from the Textract SDK types so the transform
//! itself is exercised by plain unit tests, with `textract.rs` doing the
//! (thin) conversion from the wire types.

use std::collections::HashMap;

use models::extraction::{ExtractionResult, KeyValue, Table};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    Line,
    Word,
    KeyValueSet,
    Table,
    Cell,
    SelectionElement,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityType {
    Key,
    Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionStatus {
    Selected,
    NotSelected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipType {
    Child,
    Value,
}

#[derive(Debug, Clone)]
pub struct Relationship {
    pub kind: RelationshipType,
    pub ids: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Block {
    pub id: String,
    pub block_type: BlockType,
    pub text: Option<String>,
    pub confidence: Option<f32>,
    pub entity_types: Vec<EntityType>,
    pub relationships: Vec<Relationship>,
    pub row_index: Option<u32>,
    pub column_index: Option<u32>,
    pub selection_status: Option<SelectionStatus>,
}

impl Block {
    fn children(&self, kind: RelationshipType) -> impl Iterator<Item = &str> {
        self.relationships
            .iter()
            .filter(move |r| r.kind == kind)
            .flat_map(|r| r.ids.iter().map(String::as_str))
    }
}

fn by_id(blocks: &[Block]) -> HashMap<&str, &Block> {
    blocks.iter().map(|b| (b.id.as_str(), b)).collect()
}

/// Concatenates a block's child WORD/SELECTION_ELEMENT text, rendering a
/// selection element as `[X]` or `[ ]`, space-joined and trimmed.
fn rendered_text(block: &Block, index: &HashMap<&str, &Block>) -> String {
    let mut parts = Vec::new();
    for child_id in block.children(RelationshipType::Child) {
        let Some(child) = index.get(child_id) else {
            continue;
        };
        match child.block_type {
            BlockType::Word => {
                if let Some(text) = &child.text {
                    parts.push(text.clone());
                }
            }
            BlockType::SelectionElement => {
                let selected = matches!(child.selection_status, Some(SelectionStatus::Selected));
                parts.push(if selected { "[X]".to_string() } else { "[ ]".to_string() });
            }
            _ => {}
        }
    }
    parts.join(" ").trim().to_string()
}

/// Raw text = LINE blocks' text, newline-joined, empty lines elided.
fn raw_text(blocks: &[Block]) -> String {
    blocks
        .iter()
        .filter(|b| b.block_type == BlockType::Line)
        .filter_map(|b| b.text.as_deref())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn key_values(blocks: &[Block], index: &HashMap<&str, &Block>) -> Vec<KeyValue> {
    let mut out = Vec::new();
    for block in blocks {
        if block.block_type != BlockType::KeyValueSet {
            continue;
        }
        if !block.entity_types.contains(&EntityType::Key) {
            continue;
        }
        let Some(value_id) = block.children(RelationshipType::Value).next() else {
            continue;
        };
        let Some(value_block) = index.get(value_id) else {
            continue;
        };

        let key_text = rendered_text(block, index);
        let value_text = rendered_text(value_block, index);
        let confidence = match (block.confidence, value_block.confidence) {
            (Some(a), Some(b)) => (a + b) / 2.0,
            (Some(a), None) | (None, Some(a)) => a,
            (None, None) => 0.0,
        };

        out.push(KeyValue {
            key: key_text,
            value: value_text,
            confidence,
        });
    }
    out
}

fn tables(blocks: &[Block], index: &HashMap<&str, &Block>) -> Vec<Table> {
    let mut out = Vec::new();
    for block in blocks {
        if block.block_type != BlockType::Table {
            continue;
        }

        let mut cells: Vec<&Block> = block
            .children(RelationshipType::Child)
            .filter_map(|id| index.get(id))
            .filter(|b| b.block_type == BlockType::Cell)
            .copied()
            .collect();
        cells.sort_by_key(|c| (c.row_index.unwrap_or(0), c.column_index.unwrap_or(0)));

        let max_row = cells.iter().map(|c| c.row_index.unwrap_or(0)).max().unwrap_or(0);
        let max_col = cells
            .iter()
            .map(|c| c.column_index.unwrap_or(0))
            .max()
            .unwrap_or(0);

        let mut rows = vec![vec![String::new(); max_col as usize + 1]; max_row as usize + 1];
        let mut conf_sum = 0.0f32;
        let mut conf_count = 0usize;
        for cell in &cells {
            let row = cell.row_index.unwrap_or(0) as usize;
            let col = cell.column_index.unwrap_or(0) as usize;
            rows[row][col] = rendered_text(cell, index);
            if let Some(c) = cell.confidence {
                conf_sum += c;
                conf_count += 1;
            }
        }

        out.push(Table {
            rows,
            confidence: if conf_count == 0 {
                0.0
            } else {
                conf_sum / conf_count as f32
            },
        });
    }
    out
}

pub fn transform(blocks: &[Block]) -> ExtractionResult {
    let index = by_id(blocks);
    ExtractionResult {
        raw_text: raw_text(blocks),
        key_values: key_values(blocks, &index),
        tables: tables(blocks, &index),
        text_confidence: None,
    }
}

/// Mean confidence of every block of `kind` that reports one; 0 when none
/// do. Used by the plain-text-detection path, where there are no
/// KEY_VALUE_SET/TABLE blocks to average over instead.
pub fn mean_confidence(blocks: &[Block], kind: BlockType) -> f32 {
    let mut sum = 0.0f32;
    let mut count = 0usize;
    for b in blocks {
        if b.block_type == kind {
            if let Some(c) = b.confidence {
                sum += c;
                count += 1;
            }
        }
    }
    if count == 0 {
        0.0
    } else {
        sum / count as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(id: &str, text: &str) -> Block {
        Block {
            id: id.to_string(),
            block_type: BlockType::Word,
            text: Some(text.to_string()),
            confidence: Some(99.0),
            entity_types: vec![],
            relationships: vec![],
            row_index: None,
            column_index: None,
            selection_status: None,
        }
    }

    #[test]
    fn raw_text_skips_empty_lines() {
        let blocks = vec![
            Block {
                id: "l1".into(),
                block_type: BlockType::Line,
                text: Some("Invoice".into()),
                confidence: Some(98.0),
                entity_types: vec![],
                relationships: vec![],
                row_index: None,
                column_index: None,
                selection_status: None,
            },
            Block {
                id: "l2".into(),
                block_type: BlockType::Line,
                text: Some("".into()),
                confidence: Some(98.0),
                entity_types: vec![],
                relationships: vec![],
                row_index: None,
                column_index: None,
                selection_status: None,
            },
        ];
        assert_eq!(raw_text(&blocks), "Invoice");
    }

    #[test]
    fn key_value_pairs_average_confidence() {
        let key_block = Block {
            id: "k1".into(),
            block_type: BlockType::KeyValueSet,
            text: None,
            confidence: Some(90.0),
            entity_types: vec![EntityType::Key],
            relationships: vec![
                Relationship {
                    kind: RelationshipType::Child,
                    ids: vec!["w1".into()],
                },
                Relationship {
                    kind: RelationshipType::Value,
                    ids: vec!["v1".into()],
                },
            ],
            row_index: None,
            column_index: None,
            selection_status: None,
        };
        let value_block = Block {
            id: "v1".into(),
            block_type: BlockType::KeyValueSet,
            text: None,
            confidence: Some(94.0),
            entity_types: vec![EntityType::Value],
            relationships: vec![Relationship {
                kind: RelationshipType::Child,
                ids: vec!["w2".into()],
            }],
            row_index: None,
            column_index: None,
            selection_status: None,
        };
        let blocks = vec![key_block, value_block, word("w1", "Total"), word("w2", "$27,131.51")];
        let kvs = key_values(&blocks, &by_id(&blocks));
        assert_eq!(kvs.len(), 1);
        assert_eq!(kvs[0].key, "Total");
        assert_eq!(kvs[0].value, "$27,131.51");
        assert_eq!(kvs[0].confidence, 92.0);
    }

    #[test]
    fn selection_element_renders_checkbox() {
        let key_block = Block {
            id: "k1".into(),
            block_type: BlockType::KeyValueSet,
            text: None,
            confidence: Some(90.0),
            entity_types: vec![EntityType::Key],
            relationships: vec![
                Relationship {
                    kind: RelationshipType::Child,
                    ids: vec!["w1".into()],
                },
                Relationship {
                    kind: RelationshipType::Value,
                    ids: vec!["v1".into()],
                },
            ],
            row_index: None,
            column_index: None,
            selection_status: None,
        };
        let value_block = Block {
            id: "v1".into(),
            block_type: BlockType::KeyValueSet,
            text: None,
            confidence: Some(90.0),
            entity_types: vec![EntityType::Value],
            relationships: vec![Relationship {
                kind: RelationshipType::Child,
                ids: vec!["sel1".into()],
            }],
            row_index: None,
            column_index: None,
            selection_status: None,
        };
        let selection = Block {
            id: "sel1".into(),
            block_type: BlockType::SelectionElement,
            text: None,
            confidence: Some(90.0),
            entity_types: vec![],
            relationships: vec![],
            row_index: None,
            column_index: None,
            selection_status: Some(SelectionStatus::Selected),
        };
        let blocks = vec![key_block, value_block, selection, word("w1", "Agree")];
        let kvs = key_values(&blocks, &by_id(&blocks));
        assert_eq!(kvs[0].value, "[X]");
    }

    #[test]
    fn table_cells_placed_by_row_and_column_with_gaps_empty() {
        let table_block = Block {
            id: "t1".into(),
            block_type: BlockType::Table,
            text: None,
            confidence: Some(88.0),
            entity_types: vec![],
            relationships: vec![Relationship {
                kind: RelationshipType::Child,
                ids: vec!["c1".into(), "c2".into()],
            }],
            row_index: None,
            column_index: None,
            selection_status: None,
        };
        let c1 = Block {
            id: "c1".into(),
            block_type: BlockType::Cell,
            text: None,
            confidence: Some(90.0),
            entity_types: vec![],
            relationships: vec![Relationship {
                kind: RelationshipType::Child,
                ids: vec!["w1".into()],
            }],
            row_index: Some(0),
            column_index: Some(0),
            selection_status: None,
        };
        let c2 = Block {
            id: "c2".into(),
            block_type: BlockType::Cell,
            text: None,
            confidence: Some(92.0),
            entity_types: vec![],
            relationships: vec![Relationship {
                kind: RelationshipType::Child,
                ids: vec!["w2".into()],
            }],
            row_index: Some(1),
            column_index: Some(1),
            selection_status: None,
        };
        let blocks = vec![table_block, c1, c2, word("w1", "Qty"), word("w2", "3")];
        let result = tables(&blocks, &by_id(&blocks));
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].rows, vec![
            vec!["Qty".to_string(), String::new()],
            vec![String::new(), "3".to_string()],
        ]);
        assert_eq!(result[0].confidence, 91.0);
    }

    #[test]
    fn aggregate_confidence_zero_when_empty() {
        let result = transform(&[]);
        assert_eq!(result.aggregate_confidence(), 0.0);
    }
}
