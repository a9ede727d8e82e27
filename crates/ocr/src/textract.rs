//! Converts Textract wire types into the provider-agnostic [`crate::block::Block`].

use aws_sdk_textract::types::{
    Block as SdkBlock, BlockType as SdkBlockType, EntityType as SdkEntityType,
    RelationshipType as SdkRelationshipType, SelectionStatus as SdkSelectionStatus,
};

use crate::block::{Block, BlockType, EntityType, Relationship, RelationshipType, SelectionStatus};

fn block_type(t: &SdkBlockType) -> BlockType {
    match t {
        SdkBlockType::Line => BlockType::Line,
        SdkBlockType::Word => BlockType::Word,
        SdkBlockType::KeyValueSet => BlockType::KeyValueSet,
        SdkBlockType::Table => BlockType::Table,
        SdkBlockType::Cell => BlockType::Cell,
        SdkBlockType::SelectionElement => BlockType::SelectionElement,
        _ => BlockType::Other,
    }
}

fn entity_types(raw: &[SdkEntityType]) -> Vec<EntityType> {
    raw.iter()
        .filter_map(|e| match e {
            SdkEntityType::Key => Some(EntityType::Key),
            SdkEntityType::Value => Some(EntityType::Value),
            _ => None,
        })
        .collect()
}

fn selection_status(raw: Option<&SdkSelectionStatus>) -> Option<SelectionStatus> {
    match raw {
        Some(SdkSelectionStatus::Selected) => Some(SelectionStatus::Selected),
        Some(SdkSelectionStatus::NotSelected) => Some(SelectionStatus::NotSelected),
        _ => None,
    }
}

pub fn convert(raw: &[SdkBlock]) -> Vec<Block> {
    raw.iter()
        .map(|b| {
            let relationships = b
                .relationships()
                .iter()
                .filter_map(|r| {
                    let kind = match r.r#type() {
                        Some(SdkRelationshipType::Child) => RelationshipType::Child,
                        Some(SdkRelationshipType::Value) => RelationshipType::Value,
                        _ => return None,
                    };
                    Some(Relationship {
                        kind,
                        ids: r.ids().to_vec(),
                    })
                })
                .collect();

            Block {
                id: b.id().unwrap_or_default().to_string(),
                block_type: b.block_type().map(block_type).unwrap_or(BlockType::Other),
                text: b.text().map(str::to_string),
                confidence: b.confidence(),
                entity_types: entity_types(b.entity_types()),
                relationships,
                row_index: b.row_index().map(|v| v as u32),
                column_index: b.column_index().map(|v| v as u32),
                selection_status: selection_status(b.selection_status()),
            }
        })
        .collect()
}
