//! Tag composition: turning a project's six-slot field layout plus user input
//! into typed tag references and an assembled tag name.

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::{
    ApiResponse, LookupEntity, LookupKind, ProjectData, ProjectTagFieldConfig, Tag,
    TagFieldSource,
};

pub const FIELD_COUNT: usize = 6;

/// Read access to the lookup tables a tag field can reference.
pub trait LookupSource {
    /// Find an active, non-deleted entity by id.
    fn find_by_id(&self, kind: LookupKind, id: Uuid) -> Option<&LookupEntity>;

    /// Find an active, non-deleted entity by name (trimmed, case-insensitive).
    fn find_by_name(&self, kind: LookupKind, name: &str) -> Option<&LookupEntity>;

    fn display_name(&self, kind: LookupKind, id: Uuid) -> Option<&str> {
        self.find_by_id(kind, id).map(|e| e.name.as_str())
    }
}

impl LookupSource for ProjectData {
    fn find_by_id(&self, kind: LookupKind, id: Uuid) -> Option<&LookupEntity> {
        self.lookup_table(kind)
            .iter()
            .find(|e| e.id == id && e.is_active && !e.is_deleted)
    }

    fn find_by_name(&self, kind: LookupKind, name: &str) -> Option<&LookupEntity> {
        let wanted = name.trim().to_lowercase();
        self.lookup_table(kind)
            .iter()
            .find(|e| e.is_active && !e.is_deleted && e.name.trim().to_lowercase() == wanted)
    }
}

/// The six raw field values sent by a client. Lookup slots carry an entity
/// id as a string, hand-typed slots carry free text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TagFieldValues {
    pub field1_id: Option<String>,
    pub field2_id: Option<String>,
    pub field3_id: Option<String>,
    pub field4_id: Option<String>,
    pub field5_id: Option<String>,
    pub field6_id: Option<String>,
}

impl TagFieldValues {
    pub fn as_array(&self) -> [Option<&str>; FIELD_COUNT] {
        [
            self.field1_id.as_deref(),
            self.field2_id.as_deref(),
            self.field3_id.as_deref(),
            self.field4_id.as_deref(),
            self.field5_id.as_deref(),
            self.field6_id.as_deref(),
        ]
    }

    pub fn from_array(values: [Option<String>; FIELD_COUNT]) -> Self {
        let [field1_id, field2_id, field3_id, field4_id, field5_id, field6_id] = values;
        Self {
            field1_id,
            field2_id,
            field3_id,
            field4_id,
            field5_id,
            field6_id,
        }
    }
}

fn id_slot(tag: &Tag, kind: LookupKind) -> Option<Uuid> {
    match kind {
        LookupKind::Process => tag.process_id,
        LookupKind::SubProcess => tag.sub_process_id,
        LookupKind::Stream => tag.stream_id,
        LookupKind::TagType => tag.tag_type_id,
        LookupKind::TagDescriptor => tag.tag_descriptor_id,
        LookupKind::EquipmentCode => tag.equipment_code_id,
    }
}

fn id_slot_mut(tag: &mut Tag, kind: LookupKind) -> &mut Option<Uuid> {
    match kind {
        LookupKind::Process => &mut tag.process_id,
        LookupKind::SubProcess => &mut tag.sub_process_id,
        LookupKind::Stream => &mut tag.stream_id,
        LookupKind::TagType => &mut tag.tag_type_id,
        LookupKind::TagDescriptor => &mut tag.tag_descriptor_id,
        LookupKind::EquipmentCode => &mut tag.equipment_code_id,
    }
}

/// The free-text column backing a slot.
fn raw_slot(tag: &Tag, slot: usize) -> &str {
    match slot {
        1 => tag.field1_string.as_deref().unwrap_or(""),
        2 => tag.field2_string.as_deref().unwrap_or(""),
        3 => tag.field3_string.as_deref().unwrap_or(""),
        4 => tag.field4_string.as_deref().unwrap_or(""),
        5 => &tag.sequence_number,
        6 => &tag.equipment_identifier,
        _ => "",
    }
}

fn parse_id(value: &str) -> Option<Uuid> {
    Uuid::parse_str(value.trim()).ok()
}

/// The reference id stored on `tag` for the source configured at `slot`
/// (1-based). `None` for hand-typed, unused and unknown sources.
pub fn resolve_field_source_id(
    tag: &Tag,
    slot: usize,
    config: &ProjectTagFieldConfig,
) -> Option<Uuid> {
    let kind = config.slot(slot)?.source.lookup_kind()?;
    id_slot(tag, kind)
}

/// Human-readable value of `slot` (1-based).
///
/// Without a project configuration the raw stored column is returned.
pub fn resolve_field_display_value<L: LookupSource + ?Sized>(
    tag: &Tag,
    slot: usize,
    config: Option<&ProjectTagFieldConfig>,
    lookups: &L,
) -> String {
    let Some(config) = config else {
        return raw_slot(tag, slot).to_string();
    };
    let Some(field) = config.slot(slot) else {
        return String::new();
    };
    match &field.source {
        TagFieldSource::HandTyped => raw_slot(tag, slot).to_string(),
        source => source
            .lookup_kind()
            .and_then(|kind| lookups.display_name(kind, id_slot(tag, kind)?))
            .unwrap_or_default()
            .to_string(),
    }
}

/// Build a tag string from the six raw values.
///
/// Empty values and values that resolve to nothing are skipped. The separator
/// configured on a slot goes between its value and the next kept value, and
/// is never emitted after the last one.
pub fn assemble_tag_string<L: LookupSource + ?Sized>(
    values: &TagFieldValues,
    config: &ProjectTagFieldConfig,
    lookups: &L,
) -> String {
    let mut pieces: Vec<(String, &str)> = Vec::with_capacity(FIELD_COUNT);
    for (field, value) in config.fields.iter().zip(values.as_array()) {
        let Some(value) = value.filter(|v| !v.is_empty()) else {
            continue;
        };
        let resolved = match &field.source {
            TagFieldSource::HandTyped => value.to_string(),
            source => source
                .lookup_kind()
                .and_then(|kind| lookups.display_name(kind, parse_id(value)?))
                .unwrap_or_default()
                .to_string(),
        };
        if resolved.is_empty() {
            continue;
        }
        pieces.push((resolved, field.separator.as_str()));
    }

    let mut out = String::new();
    let last = pieces.len().saturating_sub(1);
    for (i, (value, separator)) in pieces.iter().enumerate() {
        out.push_str(value);
        if i < last {
            out.push_str(separator);
        }
    }
    out
}

/// Write the typed reference ids on `tag` from the input values.
///
/// Only slots with a lookup source touch the tag's id columns. The sequence
/// number and equipment identifier always take input fields 5 and 6, whatever
/// those slots are configured as.
pub fn set_tag_fields(tag: &mut Tag, input: &TagFieldValues, config: &ProjectTagFieldConfig) {
    for (field, value) in config.fields.iter().zip(input.as_array()) {
        if let Some(kind) = field.source.lookup_kind() {
            *id_slot_mut(tag, kind) = value.and_then(parse_id);
        }
    }
    tag.sequence_number = input.field5_id.clone().unwrap_or_default();
    tag.equipment_identifier = input.field6_id.clone().unwrap_or_default();
}

// --- Operations ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedTag {
    pub tag: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TagInput {
    /// Existing tag to edit. Omit to create a new tag.
    #[serde(default)]
    pub id: Option<Uuid>,
    pub tag_name: String,
    #[serde(flatten)]
    pub fields: TagFieldValues,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedTag {
    pub id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagFieldView {
    pub slot: usize,
    pub name: String,
    pub source: TagFieldSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<Uuid>,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagInfo {
    pub id: Uuid,
    pub project_id: Uuid,
    pub tag_name: String,
    pub is_active: bool,
    pub fields: Vec<TagFieldView>,
}

pub fn generate_tag(data: &ProjectData, values: &TagFieldValues) -> ApiResponse<GeneratedTag> {
    let Some(config) = &data.project.tag_fields else {
        return ApiResponse::not_found(format!(
            "Tag field configuration missing for project '{}'",
            data.project.name
        ));
    };
    let tag = assemble_tag_string(values, config, data);
    debug!(project = %data.project.id, %tag, "generated tag");
    ApiResponse::success("Tag generated", GeneratedTag { tag })
}

/// Whether a live tag of this project already uses `name` (trimmed,
/// case-insensitive), ignoring the tag `except`.
pub fn is_name_taken(data: &ProjectData, name: &str, except: Option<Uuid>) -> bool {
    let wanted = name.trim().to_lowercase();
    data.tags.iter().any(|t| {
        t.project_id == data.project.id
            && !t.is_deleted
            && Some(t.id) != except
            && t.tag_name.trim().to_lowercase() == wanted
    })
}

pub fn create_or_edit_tag(data: &mut ProjectData, input: TagInput) -> ApiResponse<SavedTag> {
    let name = input.tag_name.trim();
    if name.is_empty() {
        return ApiResponse::bad_request("Tag name is required");
    }
    if is_name_taken(data, name, input.id) {
        return ApiResponse::conflict(format!("Tag '{}' already exists", name));
    }

    let config = data.project.tag_fields.clone().unwrap_or_default();
    let project_id = data.project.id;
    match input.id {
        Some(id) => {
            let Some(tag) = data
                .tags
                .iter_mut()
                .find(|t| t.id == id && t.project_id == project_id && !t.is_deleted)
            else {
                return ApiResponse::not_found(format!("Tag '{}' not found", id));
            };
            tag.tag_name = name.to_string();
            set_tag_fields(tag, &input.fields, &config);
            ApiResponse::success("Tag updated", SavedTag { id })
        }
        None => {
            let mut tag = Tag::new(project_id, name);
            set_tag_fields(&mut tag, &input.fields, &config);
            let id = tag.id;
            data.tags.push(tag);
            ApiResponse::success("Tag created", SavedTag { id })
        }
    }
}

/// Soft-delete a tag. Refused while a live device, stand or cable uses it.
pub fn delete_tag(data: &mut ProjectData, id: Uuid) -> ApiResponse<()> {
    let Some(tag) = data.tag(id) else {
        return ApiResponse::not_found(format!("Tag '{}' not found", id));
    };
    let name = tag.tag_name.clone();

    let devices = data
        .devices
        .iter()
        .filter(|d| !d.is_deleted && d.tag_id == Some(id))
        .count();
    let stands = data
        .stands
        .iter()
        .filter(|s| !s.is_deleted && s.tag_id == Some(id))
        .count();
    let cables = data
        .cables
        .iter()
        .filter(|c| !c.is_deleted && c.tag_id == Some(id))
        .count();

    let blockers: Vec<String> = [(devices, "device"), (stands, "stand"), (cables, "cable")]
        .into_iter()
        .filter(|(n, _)| *n > 0)
        .map(|(n, what)| format!("{} {}(s)", n, what))
        .collect();
    if !blockers.is_empty() {
        return ApiResponse::conflict(format!(
            "Tag '{}' is used by {} and cannot be deleted",
            name,
            blockers.join(", ")
        ));
    }

    if let Some(tag) = data.tags.iter_mut().find(|t| t.id == id) {
        tag.is_deleted = true;
    }
    ApiResponse::done(format!("Tag '{}' deleted", name))
}

pub fn tag_info(data: &ProjectData, id: Uuid) -> ApiResponse<TagInfo> {
    let Some(tag) = data.tag(id) else {
        return ApiResponse::not_found(format!("Tag '{}' not found", id));
    };
    let config = data.project.tag_fields.as_ref();
    let fields = (1..=FIELD_COUNT)
        .map(|slot| {
            let field = config.and_then(|c| c.slot(slot));
            TagFieldView {
                slot,
                name: field.map(|f| f.name.clone()).unwrap_or_default(),
                source: field.map(|f| f.source.clone()).unwrap_or_default(),
                source_id: config.and_then(|c| resolve_field_source_id(tag, slot, c)),
                value: resolve_field_display_value(tag, slot, config, data),
            }
        })
        .collect();
    ApiResponse::success(
        "Tag found",
        TagInfo {
            id: tag.id,
            project_id: tag.project_id,
            tag_name: tag.tag_name.clone(),
            is_active: tag.is_active,
            fields,
        },
    )
}
