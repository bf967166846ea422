pub mod error;
pub mod hierarchy;
pub mod response;
pub mod settings;
pub mod tag;

pub use error::{Error, Result};
pub use response::ApiResponse;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;
use uuid::Uuid;

// --- Types ---

/// Where the value of one tag field slot comes from.
///
/// Stored as a plain string. Strings that don't name a known source parse to
/// `Unknown`, which behaves like `NotUsed` but keeps the raw value so the
/// configuration round-trips unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TagFieldSource {
    #[default]
    NotUsed,
    HandTyped,
    Process,
    SubProcess,
    Stream,
    TagTypeId,
    Descriptor,
    EquipmentCode,
    Unknown(String),
}

impl TagFieldSource {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "notused" => Self::NotUsed,
            "handtyped" => Self::HandTyped,
            "process" => Self::Process,
            "subprocess" => Self::SubProcess,
            "stream" => Self::Stream,
            "tagtypeid" => Self::TagTypeId,
            "descriptor" => Self::Descriptor,
            "equipmentcode" => Self::EquipmentCode,
            _ => Self::Unknown(s.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::NotUsed => "NotUsed",
            Self::HandTyped => "HandTyped",
            Self::Process => "Process",
            Self::SubProcess => "SubProcess",
            Self::Stream => "Stream",
            Self::TagTypeId => "TagTypeId",
            Self::Descriptor => "Descriptor",
            Self::EquipmentCode => "EquipmentCode",
            Self::Unknown(raw) => raw,
        }
    }

    /// The lookup table this source reads from, if any.
    pub fn lookup_kind(&self) -> Option<LookupKind> {
        match self {
            Self::Process => Some(LookupKind::Process),
            Self::SubProcess => Some(LookupKind::SubProcess),
            Self::Stream => Some(LookupKind::Stream),
            Self::TagTypeId => Some(LookupKind::TagType),
            Self::Descriptor => Some(LookupKind::TagDescriptor),
            Self::EquipmentCode => Some(LookupKind::EquipmentCode),
            Self::NotUsed | Self::HandTyped | Self::Unknown(_) => None,
        }
    }
}

impl From<String> for TagFieldSource {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<TagFieldSource> for String {
    fn from(source: TagFieldSource) -> Self {
        source.as_str().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LookupKind {
    Process,
    SubProcess,
    Stream,
    TagType,
    TagDescriptor,
    EquipmentCode,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagFieldConfig {
    #[serde(default)]
    pub source: TagFieldSource,
    #[serde(default)]
    pub separator: String,
    #[serde(default)]
    pub is_used: bool,
    #[serde(default)]
    pub name: String,
}

impl TagFieldConfig {
    pub fn new(source: TagFieldSource, separator: &str) -> Self {
        Self {
            is_used: source != TagFieldSource::NotUsed,
            source,
            separator: separator.to_string(),
            name: String::new(),
        }
    }
}

/// The six field slots of a project's tag layout, in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectTagFieldConfig {
    pub fields: [TagFieldConfig; tag::FIELD_COUNT],
}

impl ProjectTagFieldConfig {
    pub fn new(fields: [TagFieldConfig; tag::FIELD_COUNT]) -> Self {
        Self { fields }
    }

    /// Slot lookup, 1-based.
    pub fn slot(&self, slot: usize) -> Option<&TagFieldConfig> {
        slot.checked_sub(1).and_then(|i| self.fields.get(i))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupEntity {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_deleted: bool,
}

impl LookupEntity {
    pub fn new(name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: String::new(),
            is_active: true,
            is_deleted: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: Uuid,
    pub project_id: Uuid,
    pub tag_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_process_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_type_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_descriptor_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equipment_code_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field1_string: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field2_string: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field3_string: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field4_string: Option<String>,
    #[serde(default)]
    pub sequence_number: String,
    #[serde(default)]
    pub equipment_identifier: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_deleted: bool,
}

impl Tag {
    pub fn new(project_id: Uuid, tag_name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id,
            tag_name: tag_name.to_string(),
            process_id: None,
            sub_process_id: None,
            stream_id: None,
            tag_type_id: None,
            tag_descriptor_id: None,
            equipment_code_id: None,
            field1_string: None,
            field2_string: None,
            field3_string: None,
            field4_string: None,
            sequence_number: String::new(),
            equipment_identifier: String::new(),
            is_active: true,
            is_deleted: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: Uuid,
    pub project_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_id: Option<Uuid>,
    /// "Y", "N", or [`hierarchy::UNCLASSIFIED_INSTRUMENT`].
    #[serde(default = "default_unclassified")]
    pub is_instrument: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_system_id: Option<Uuid>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_deleted: bool,
}

impl Device {
    pub fn new(project_id: Uuid, tag_id: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id,
            tag_id,
            is_instrument: default_unclassified(),
            sub_system_id: None,
            is_active: true,
            is_deleted: false,
        }
    }
}

/// Which relation a control edge records: the device's connection parent or
/// its instrument parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParentKind {
    Connection,
    Instrument,
}

impl ParentKind {
    pub fn from_instrument_flag(instrument: bool) -> Self {
        if instrument {
            Self::Instrument
        } else {
            Self::Connection
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlEdge {
    pub id: Uuid,
    pub parent_device_id: Uuid,
    pub child_device_id: Uuid,
    pub kind: ParentKind,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_deleted: bool,
}

impl ControlEdge {
    pub fn new(parent_device_id: Uuid, child_device_id: Uuid, kind: ParentKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_device_id,
            child_device_id,
            kind,
            is_active: true,
            is_deleted: false,
        }
    }

    pub fn is_live(&self) -> bool {
        self.is_active && !self.is_deleted
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkAreaPack {
    pub id: Uuid,
    pub project_id: Uuid,
    pub number: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct System {
    pub id: Uuid,
    pub work_area_pack_id: Uuid,
    pub number: String,
    #[serde(default)]
    pub is_deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubSystem {
    pub id: Uuid,
    pub system_id: Uuid,
    pub number: String,
    #[serde(default)]
    pub is_deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stand {
    pub id: Uuid,
    pub project_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_id: Option<Uuid>,
    #[serde(default)]
    pub is_deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cable {
    pub id: Uuid,
    pub project_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_id: Option<Uuid>,
    #[serde(default)]
    pub is_deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_fields: Option<ProjectTagFieldConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropdownInfo {
    pub id: Uuid,
    pub name: String,
}

/// Everything stored for one project. Each project lives in its own document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectData {
    pub project: Project,
    #[serde(default)]
    pub processes: Vec<LookupEntity>,
    #[serde(default)]
    pub sub_processes: Vec<LookupEntity>,
    #[serde(default)]
    pub streams: Vec<LookupEntity>,
    #[serde(default)]
    pub tag_types: Vec<LookupEntity>,
    #[serde(default)]
    pub tag_descriptors: Vec<LookupEntity>,
    #[serde(default)]
    pub equipment_codes: Vec<LookupEntity>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub devices: Vec<Device>,
    #[serde(default)]
    pub control_edges: Vec<ControlEdge>,
    #[serde(default)]
    pub work_area_packs: Vec<WorkAreaPack>,
    #[serde(default)]
    pub systems: Vec<System>,
    #[serde(default)]
    pub sub_systems: Vec<SubSystem>,
    #[serde(default)]
    pub stands: Vec<Stand>,
    #[serde(default)]
    pub cables: Vec<Cable>,
}

impl ProjectData {
    pub fn new(project: Project) -> Self {
        Self {
            project,
            processes: Vec::new(),
            sub_processes: Vec::new(),
            streams: Vec::new(),
            tag_types: Vec::new(),
            tag_descriptors: Vec::new(),
            equipment_codes: Vec::new(),
            tags: Vec::new(),
            devices: Vec::new(),
            control_edges: Vec::new(),
            work_area_packs: Vec::new(),
            systems: Vec::new(),
            sub_systems: Vec::new(),
            stands: Vec::new(),
            cables: Vec::new(),
        }
    }

    pub fn lookup_table(&self, kind: LookupKind) -> &[LookupEntity] {
        match kind {
            LookupKind::Process => &self.processes,
            LookupKind::SubProcess => &self.sub_processes,
            LookupKind::Stream => &self.streams,
            LookupKind::TagType => &self.tag_types,
            LookupKind::TagDescriptor => &self.tag_descriptors,
            LookupKind::EquipmentCode => &self.equipment_codes,
        }
    }

    /// Find a non-deleted tag of this project.
    pub fn tag(&self, id: Uuid) -> Option<&Tag> {
        self.tags
            .iter()
            .find(|t| t.id == id && t.project_id == self.project.id && !t.is_deleted)
    }

    /// Find a non-deleted device of this project.
    pub fn device(&self, id: Uuid) -> Option<&Device> {
        self.devices
            .iter()
            .find(|d| d.id == id && d.project_id == self.project.id && !d.is_deleted)
    }

    /// A device is displayed under its tag's name.
    pub fn device_name(&self, device: &Device) -> &str {
        device
            .tag_id
            .and_then(|tid| self.tags.iter().find(|t| t.id == tid))
            .map(|t| t.tag_name.as_str())
            .unwrap_or("")
    }
}

fn default_true() -> bool {
    true
}

fn default_unclassified() -> String {
    hierarchy::UNCLASSIFIED_INSTRUMENT.to_string()
}

// --- Storage ---

/// Resolve the ICMD home directory (`$ICMD_HOME`, else `~/.icmd`).
pub fn icmd_home() -> PathBuf {
    if let Some(dir) = std::env::var_os("ICMD_HOME") {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".icmd")
}

/// Project documents on disk, one `<project-id>.icmd` JSON file per project.
#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn open_default() -> Self {
        Self::new(icmd_home().join("projects"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn project_path(&self, id: Uuid) -> PathBuf {
        self.root.join(format!("{}.icmd", id))
    }

    /// List all readable projects, sorted by name. Unreadable documents are
    /// skipped with a warning.
    pub fn list_projects(&self) -> Result<Vec<Project>> {
        if !self.root.exists() {
            return Ok(vec![]);
        }
        let mut projects = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            let Some(id) = name
                .strip_suffix(".icmd")
                .and_then(|stem| Uuid::parse_str(stem).ok())
            else {
                continue;
            };
            match self.read_project(id) {
                Ok(data) => projects.push(data.project),
                Err(e) => warn!(project = %id, error = %e, "skipping unreadable project"),
            }
        }
        projects.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        Ok(projects)
    }

    pub fn read_project(&self, id: Uuid) -> Result<ProjectData> {
        let path = self.project_path(id);
        if !path.exists() {
            return Err(Error::ProjectNotFound(id));
        }
        let raw = fs::read_to_string(&path)?;
        serde_json::from_str(&raw).map_err(|source| Error::InvalidProjectFile { id, source })
    }

    /// Write a project document.
    ///
    /// Writes go to a temp file that is then renamed over the target, so a
    /// concurrent reader sees either the old or the new document, never a
    /// truncated one.
    pub fn write_project(&self, data: &ProjectData) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        let id = data.project.id;
        let json = serde_json::to_string_pretty(data)?;
        let tmp = self.root.join(format!(".{}.icmd.tmp", id));
        fs::write(&tmp, json)?;
        fs::rename(&tmp, self.project_path(id))?;
        Ok(())
    }

    pub fn delete_project(&self, id: Uuid) -> Result<()> {
        let path = self.project_path(id);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }
}
