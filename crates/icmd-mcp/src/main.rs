use icmd_core::hierarchy::{self, HierarchyNode};
use icmd_core::tag::{self, TagFieldValues, TagInput};
use icmd_core::{ApiResponse, ParentKind, ProjectData, Store};
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    schemars, tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

// --- Request types ---
//
// Argument names are camelCase throughout so they line up with the flattened
// tag fields (`tagName`, `field1Id`, ...).

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
struct GenerateTagRequest {
    /// ID (UUID) of the project whose tag field layout is used
    project_id: String,
    /// Raw values for the six field slots. Lookup slots take the entity ID, hand-typed slots take free text.
    #[serde(flatten)]
    fields: TagFieldValues,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
struct TagRequest {
    /// ID (UUID) of the project
    project_id: String,
    /// ID (UUID) of the tag
    tag_id: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
struct CreateOrEditTagRequest {
    /// ID (UUID) of the project
    project_id: String,
    /// Tag to save. Include "id" to edit an existing tag, omit it to create one. tagName must be unique within the project (case-insensitive).
    #[serde(flatten)]
    tag: TagInput,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
struct GetHierarchyRequest {
    /// ID (UUID) of the project
    project_id: String,
    /// Status filter: "All" (default), "Active", or "Inactive"
    option: Option<String>,
    /// Hierarchy to build: "Control" or "CCMD"
    hierarchy_type: String,
    /// Return an indented text outline instead of JSON
    outline: Option<bool>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
struct SetDeviceParentRequest {
    /// ID (UUID) of the project
    project_id: String,
    /// ID (UUID) of the device whose parent changes
    child_device_id: String,
    /// ID (UUID) of the new parent device. Omit to detach the device.
    parent_device_id: Option<String>,
    /// true to set the instrument parent, false (default) for the connection parent
    instrument: Option<bool>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
struct ProjectRequest {
    /// ID (UUID) of the project
    project_id: String,
}

// --- Server ---

#[derive(Clone)]
pub struct IcmdServer {
    store: Store,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl IcmdServer {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(description = "List all projects with their IDs")]
    fn list_projects(&self) -> Result<CallToolResult, McpError> {
        match self.store.list_projects() {
            Ok(projects) => {
                let text = if projects.is_empty() {
                    "No projects found.".to_string()
                } else {
                    projects
                        .iter()
                        .map(|p| format!("{} ({})", p.name, p.id))
                        .collect::<Vec<_>>()
                        .join("\n")
                };
                Ok(CallToolResult::success(vec![Content::text(text)]))
            }
            Err(e) => Ok(CallToolResult::error(vec![Content::text(e.to_string())])),
        }
    }

    #[tool(
        description = "Assemble a tag name from six field values using the project's tag field layout. Lookup slots (process, sub-process, stream, tag type, descriptor, equipment code) are resolved to their names; empty slots are skipped; each slot's separator is placed between it and the next non-empty slot. Returns {isSucceeded, message, statusCode, data: {tag}}."
    )]
    fn generate_tag(
        &self,
        Parameters(req): Parameters<GenerateTagRequest>,
    ) -> Result<CallToolResult, McpError> {
        let project_id = parse_uuid(&req.project_id, "projectId")?;
        let data = match self.load(project_id) {
            Ok(d) => d,
            Err(result) => return Ok(result),
        };
        Ok(respond(tag::generate_tag(&data, &req.fields)))
    }

    #[tool(
        description = "Get a tag with the source, referenced ID and display value of each of its six field slots"
    )]
    fn get_tag(&self, Parameters(req): Parameters<TagRequest>) -> Result<CallToolResult, McpError> {
        let project_id = parse_uuid(&req.project_id, "projectId")?;
        let tag_id = parse_uuid(&req.tag_id, "tagId")?;
        let data = match self.load(project_id) {
            Ok(d) => d,
            Err(result) => return Ok(result),
        };
        Ok(respond(tag::tag_info(&data, tag_id)))
    }

    #[tool(
        description = "Create a tag, or edit one when \"id\" is given. Lookup slots store the referenced IDs; field5Id and field6Id are also stored as sequence number and equipment identifier."
    )]
    fn create_or_edit_tag(
        &self,
        Parameters(req): Parameters<CreateOrEditTagRequest>,
    ) -> Result<CallToolResult, McpError> {
        let project_id = parse_uuid(&req.project_id, "projectId")?;
        let input = req.tag;
        Ok(self.update(project_id, |data| tag::create_or_edit_tag(data, input)))
    }

    #[tool(
        description = "Soft-delete a tag. Refused while any device, stand or cable still uses it."
    )]
    fn delete_tag(
        &self,
        Parameters(req): Parameters<TagRequest>,
    ) -> Result<CallToolResult, McpError> {
        let project_id = parse_uuid(&req.project_id, "projectId")?;
        let tag_id = parse_uuid(&req.tag_id, "tagId")?;
        Ok(self.update(project_id, |data| tag::delete_tag(data, tag_id)))
    }

    #[tool(
        description = "Get a device hierarchy. \"Control\" nests devices under their connection/instrument parents and collects parentless devices without connection children under a \"Not Attached\" folder. \"CCMD\" nests devices under work area pack > system > sub-system. Response is {deviceList: [{id, name, isFolder, isActive, instrument, childrenList}], tagList: [{id, name}]}, or an outline when outline=true."
    )]
    fn get_hierarchy(
        &self,
        Parameters(req): Parameters<GetHierarchyRequest>,
    ) -> Result<CallToolResult, McpError> {
        let project_id = parse_uuid(&req.project_id, "projectId")?;
        let data = match self.load(project_id) {
            Ok(d) => d,
            Err(result) => return Ok(result),
        };
        let option = req.option.as_deref().unwrap_or("All");
        let resp = hierarchy::get_hierarchy_data(&data, option, &req.hierarchy_type);

        let text = if req.outline.unwrap_or(false) {
            let outline = render_outline(&resp.device_list);
            if outline.is_empty() {
                "No devices.".to_string()
            } else {
                outline
            }
        } else {
            to_json(&resp)
        };
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }

    #[tool(
        description = "Set or clear a device's connection parent (default) or instrument parent. The previous parent of that kind is replaced. Changes that would put a device below itself are rejected."
    )]
    fn set_device_parent(
        &self,
        Parameters(req): Parameters<SetDeviceParentRequest>,
    ) -> Result<CallToolResult, McpError> {
        let project_id = parse_uuid(&req.project_id, "projectId")?;
        let child = parse_uuid(&req.child_device_id, "childDeviceId")?;
        let parent = req
            .parent_device_id
            .as_deref()
            .map(|p| parse_uuid(p, "parentDeviceId"))
            .transpose()?;
        let kind = ParentKind::from_instrument_flag(req.instrument.unwrap_or(false));
        Ok(self.update(project_id, |data| {
            hierarchy::set_device_parent(data, child, parent, kind)
        }))
    }

    #[tool(
        description = "Report devices that hold more than one active parent edge of the same kind (connection or instrument)"
    )]
    fn check_edges(
        &self,
        Parameters(req): Parameters<ProjectRequest>,
    ) -> Result<CallToolResult, McpError> {
        let project_id = parse_uuid(&req.project_id, "projectId")?;
        let data = match self.load(project_id) {
            Ok(d) => d,
            Err(result) => return Ok(result),
        };
        let violations = hierarchy::edge_violations(&data);
        let text = if violations.is_empty() {
            "No edge violations.".to_string()
        } else {
            to_json(&violations)
        };
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }
}

impl IcmdServer {
    fn load(&self, project_id: Uuid) -> Result<ProjectData, CallToolResult> {
        self.store.read_project(project_id).map_err(|e| {
            CallToolResult::error(vec![Content::text(format!(
                "Failed to read project '{}': {}",
                project_id, e
            ))])
        })
    }

    /// Read a project, apply `op`, and write it back if `op` succeeded.
    fn update<T: Serialize>(
        &self,
        project_id: Uuid,
        op: impl FnOnce(&mut ProjectData) -> ApiResponse<T>,
    ) -> CallToolResult {
        let mut data = match self.load(project_id) {
            Ok(d) => d,
            Err(result) => return result,
        };
        let resp = op(&mut data);
        if resp.is_succeeded {
            if let Err(e) = self.store.write_project(&data) {
                warn!(project = %project_id, error = %e, "failed to write project");
                return CallToolResult::error(vec![Content::text(format!(
                    "Failed to write project '{}': {}",
                    project_id, e
                ))]);
            }
        }
        respond(resp)
    }
}

#[tool_handler]
impl ServerHandler for IcmdServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(INSTRUCTIONS.into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

// --- Helpers ---

fn parse_uuid(s: &str, field: &str) -> Result<Uuid, McpError> {
    Uuid::parse_str(s.trim()).map_err(|_| {
        McpError::invalid_params(format!("Invalid {} '{}': expected a UUID", field, s), None)
    })
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("Serialization error: {}", e))
}

/// Business failures become tool errors so the agent notices them.
fn respond<T: Serialize>(resp: ApiResponse<T>) -> CallToolResult {
    let text = to_json(&resp);
    if resp.is_succeeded {
        CallToolResult::success(vec![Content::text(text)])
    } else {
        CallToolResult::error(vec![Content::text(text)])
    }
}

/// Indented outline of a hierarchy, one node per line.
fn render_outline(nodes: &[HierarchyNode]) -> String {
    let mut out = String::new();
    render_nodes(&mut out, nodes, 0);
    out
}

fn render_nodes(out: &mut String, nodes: &[HierarchyNode], indent: usize) {
    for node in nodes {
        out.push_str(&"  ".repeat(indent));
        out.push_str("- ");
        out.push_str(if node.name.is_empty() { "(unnamed)" } else { &node.name });
        if node.is_folder {
            out.push('/');
        } else {
            out.push_str(" [");
            out.push_str(&node.id.to_string());
            out.push(']');
        }
        if node.instrument {
            out.push_str(" (instrument)");
        }
        if !node.is_active {
            out.push_str(" (inactive)");
        }
        out.push('\n');
        render_nodes(out, &node.children_list, indent + 1);
    }
}

const INSTRUCTIONS: &str = r#"ICMD instrumentation data: projects, tags and device hierarchies.

Call `list_projects` first to find project IDs. All other tools take a projectId.

## Tags
- `generate_tag` previews a tag name from six field values using the project's field layout. Use it before `create_or_edit_tag` so the stored name matches the layout.
- Tag names are unique per project, ignoring case and surrounding whitespace. A duplicate is reported as a conflict (statusCode 409).
- `delete_tag` is refused while devices, stands or cables use the tag.

## Hierarchies
- `get_hierarchy` with hierarchyType "Control" or "CCMD"; pass outline=true for a readable tree.
- `set_device_parent` changes one parent at a time. Each device has at most one connection parent and one instrument parent.
- `check_edges` reports devices that break that rule in stored data."#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = icmd_core::settings::read_settings();

    // stdout carries the protocol, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter)),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let store = settings.store();
    info!(data_dir = %store.root().display(), "starting icmd-mcp");

    let service = IcmdServer::new(store)
        .serve(rmcp::transport::io::stdio())
        .await
        .inspect_err(|e| tracing::error!(error = %e, "MCP server error"))?;
    service.waiting().await?;
    Ok(())
}
