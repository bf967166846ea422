//! Device hierarchy trees for display: the control hierarchy built from
//! parent/child device edges, and the fixed-depth CCMD containment hierarchy.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{ApiResponse, ControlEdge, Device, DropdownInfo, ParentKind, ProjectData};

pub const NOT_ATTACHED: &str = "Not Attached";

/// `Device::is_instrument` value for devices that are not classified yet.
pub const UNCLASSIFIED_INSTRUMENT: &str = "-";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusFilter {
    #[default]
    All,
    Active,
    Inactive,
}

impl StatusFilter {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Some(Self::All),
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HierarchyType {
    Control,
    Ccmd,
}

impl HierarchyType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "control" => Some(Self::Control),
            "ccmd" => Some(Self::Ccmd),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyNode {
    pub id: Uuid,
    pub name: String,
    pub is_folder: bool,
    pub is_active: bool,
    pub instrument: bool,
    #[serde(default)]
    pub children_list: Vec<HierarchyNode>,
}

impl HierarchyNode {
    pub fn device(id: Uuid, name: &str, is_active: bool, instrument: bool) -> Self {
        Self {
            id,
            name: name.to_string(),
            is_folder: false,
            is_active,
            instrument,
            children_list: Vec::new(),
        }
    }

    pub fn folder(id: Uuid, name: &str, children_list: Vec<HierarchyNode>) -> Self {
        Self {
            id,
            name: name.to_string(),
            is_folder: true,
            is_active: true,
            instrument: false,
            children_list,
        }
    }

    /// True if this node or anything below it is inactive.
    pub fn contains_inactive(&self) -> bool {
        !self.is_active || self.children_list.iter().any(HierarchyNode::contains_inactive)
    }

    /// Depth-first search by id.
    pub fn find(&self, id: Uuid) -> Option<&HierarchyNode> {
        if self.id == id {
            return Some(self);
        }
        self.children_list.iter().find_map(|c| c.find(id))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyResponse {
    pub device_list: Vec<HierarchyNode>,
    pub tag_list: Vec<DropdownInfo>,
}

/// What the control hierarchy needs to know about a device.
#[derive(Debug, Clone, Copy)]
pub struct DeviceEntry<'a> {
    pub id: Uuid,
    pub name: &'a str,
    pub is_active: bool,
}

/// Live devices of the project, in stored order.
pub fn device_entries(data: &ProjectData) -> Vec<DeviceEntry<'_>> {
    data.devices
        .iter()
        .filter(|d| !d.is_deleted && d.project_id == data.project.id)
        .map(|d| DeviceEntry {
            id: d.id,
            name: data.device_name(d),
            is_active: d.is_active,
        })
        .collect()
}

// --- Control hierarchy ---

struct TreeBuilder<'a> {
    devices: HashMap<Uuid, DeviceEntry<'a>>,
    outbound: HashMap<Uuid, Vec<&'a ControlEdge>>,
    /// Devices with at least one inbound instrument edge.
    has_instrument_parent: HashSet<Uuid>,
}

impl<'a> TreeBuilder<'a> {
    /// Expand `device` and its descendants. `path` holds the ancestors of
    /// `device`; a child already on it closes a cycle and is not expanded.
    fn expand(
        &self,
        device: DeviceEntry<'a>,
        path: &mut Vec<Uuid>,
        reached: &mut HashSet<Uuid>,
    ) -> HierarchyNode {
        reached.insert(device.id);
        path.push(device.id);

        let mut children = Vec::new();
        for edge in self.outbound.get(&device.id).into_iter().flatten() {
            if path.contains(&edge.child_device_id) {
                warn!(
                    parent = %device.id,
                    child = %edge.child_device_id,
                    "control hierarchy cycle, not expanding child again"
                );
                continue;
            }
            if let Some(child) = self.devices.get(&edge.child_device_id) {
                children.push(self.expand(*child, path, reached));
            }
        }

        path.pop();
        let instrument = self.has_instrument_parent.contains(&device.id);
        let mut node = HierarchyNode::device(device.id, device.name, device.is_active, instrument);
        node.children_list = children;
        node
    }
}

/// Build the control hierarchy.
///
/// Devices without a parent become roots when they have at least one
/// connection child; the rest (including devices with no edges, or only
/// instrument children) go into the "Not Attached" folder, as do devices that
/// are only reachable through a cycle. Every non-deleted edge between the
/// given devices is used, whatever its `is_active` flag. A node is marked
/// `instrument` when any of its inbound edges is an instrument edge.
pub fn control_hierarchy(
    devices: &[DeviceEntry<'_>],
    edges: &[ControlEdge],
    filter: StatusFilter,
) -> Vec<HierarchyNode> {
    let known: HashMap<Uuid, DeviceEntry<'_>> = devices.iter().map(|d| (d.id, *d)).collect();

    let mut outbound: HashMap<Uuid, Vec<&ControlEdge>> = HashMap::new();
    let mut has_parent: HashSet<Uuid> = HashSet::new();
    let mut has_instrument_parent: HashSet<Uuid> = HashSet::new();
    for edge in edges.iter().filter(|e| {
        !e.is_deleted
            && known.contains_key(&e.parent_device_id)
            && known.contains_key(&e.child_device_id)
    }) {
        outbound.entry(edge.parent_device_id).or_default().push(edge);
        has_parent.insert(edge.child_device_id);
        if edge.kind == ParentKind::Instrument {
            has_instrument_parent.insert(edge.child_device_id);
        }
    }

    let builder = TreeBuilder {
        devices: known,
        outbound,
        has_instrument_parent,
    };
    let mut reached = HashSet::new();
    let mut roots = Vec::new();
    let mut not_attached = Vec::new();

    for device in devices.iter().filter(|d| !has_parent.contains(&d.id)) {
        let has_connection_child = builder
            .outbound
            .get(&device.id)
            .is_some_and(|es| es.iter().any(|e| e.kind == ParentKind::Connection));
        let node = builder.expand(*device, &mut Vec::new(), &mut reached);
        if has_connection_child {
            roots.push(node);
        } else {
            not_attached.push(node);
        }
    }

    for device in devices {
        if !reached.contains(&device.id) {
            warn!(device = %device.id, "device only reachable through a cycle");
            not_attached.push(builder.expand(*device, &mut Vec::new(), &mut reached));
        }
    }

    debug!(
        roots = roots.len(),
        not_attached = not_attached.len(),
        "built control hierarchy"
    );
    if !not_attached.is_empty() {
        roots.push(HierarchyNode::folder(Uuid::nil(), NOT_ATTACHED, not_attached));
    }

    match filter {
        StatusFilter::All => roots,
        StatusFilter::Active => find_records_with_active_parents_or_children(roots),
        StatusFilter::Inactive => find_records_with_inactive_parents_or_children(roots),
    }
}

/// Drop every inactive node, at every level, together with its subtree.
/// Folders are always active, so the "Not Attached" folder stays even when
/// all of its devices were removed.
pub fn find_records_with_active_parents_or_children(
    nodes: Vec<HierarchyNode>,
) -> Vec<HierarchyNode> {
    nodes
        .into_iter()
        .filter(|n| n.is_active)
        .map(|mut node| {
            let children = std::mem::take(&mut node.children_list);
            node.children_list = find_records_with_active_parents_or_children(children);
            node
        })
        .collect()
}

/// Keep only nodes that are inactive or have an inactive descendant, at
/// every level.
pub fn find_records_with_inactive_parents_or_children(
    nodes: Vec<HierarchyNode>,
) -> Vec<HierarchyNode> {
    nodes
        .into_iter()
        .filter(HierarchyNode::contains_inactive)
        .map(|mut node| {
            node.children_list = find_records_with_inactive_parents_or_children(std::mem::take(
                &mut node.children_list,
            ));
            node
        })
        .collect()
}

// --- CCMD hierarchy ---

fn ccmd_device_matches(device: &Device, filter: StatusFilter) -> bool {
    if device.is_instrument == UNCLASSIFIED_INSTRUMENT {
        return false;
    }
    match filter {
        StatusFilter::All => true,
        StatusFilter::Active => device.is_active,
        StatusFilter::Inactive => !device.is_active,
    }
}

/// WorkAreaPack → System → SubSystem → Device, top-down.
///
/// Systems and sub-systems without any matching device are pruned; work area
/// packs are always listed.
pub fn ccmd_hierarchy(data: &ProjectData, filter: StatusFilter) -> Vec<HierarchyNode> {
    data.work_area_packs
        .iter()
        .filter(|w| !w.is_deleted && w.project_id == data.project.id)
        .map(|pack| {
            let systems = data
                .systems
                .iter()
                .filter(|s| !s.is_deleted && s.work_area_pack_id == pack.id)
                .filter_map(|system| {
                    let sub_systems: Vec<HierarchyNode> = data
                        .sub_systems
                        .iter()
                        .filter(|ss| !ss.is_deleted && ss.system_id == system.id)
                        .filter_map(|sub| {
                            let devices: Vec<HierarchyNode> = data
                                .devices
                                .iter()
                                .filter(|d| {
                                    !d.is_deleted
                                        && d.sub_system_id == Some(sub.id)
                                        && ccmd_device_matches(d, filter)
                                })
                                .map(|d| {
                                    HierarchyNode::device(
                                        d.id,
                                        data.device_name(d),
                                        d.is_active,
                                        d.is_instrument.eq_ignore_ascii_case("y"),
                                    )
                                })
                                .collect();
                            (!devices.is_empty())
                                .then(|| HierarchyNode::folder(sub.id, &sub.number, devices))
                        })
                        .collect();
                    (!sub_systems.is_empty())
                        .then(|| HierarchyNode::folder(system.id, &system.number, sub_systems))
                })
                .collect();
            HierarchyNode::folder(pack.id, &pack.number, systems)
        })
        .collect()
}

// --- Request entry point ---

/// Live tags of the project for the tag picker, sorted by name.
pub fn tag_dropdown(data: &ProjectData) -> Vec<DropdownInfo> {
    let mut tags: Vec<DropdownInfo> = data
        .tags
        .iter()
        .filter(|t| !t.is_deleted && t.project_id == data.project.id)
        .map(|t| DropdownInfo {
            id: t.id,
            name: t.tag_name.clone(),
        })
        .collect();
    tags.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    tags
}

pub fn hierarchy(
    data: &ProjectData,
    filter: StatusFilter,
    kind: HierarchyType,
) -> HierarchyResponse {
    let device_list = match kind {
        HierarchyType::Control => {
            control_hierarchy(&device_entries(data), &data.control_edges, filter)
        }
        HierarchyType::Ccmd => ccmd_hierarchy(data, filter),
    };
    HierarchyResponse {
        device_list,
        tag_list: tag_dropdown(data),
    }
}

/// String-typed entry point used by the request handlers. An unknown filter
/// means no filtering; an unknown hierarchy type gives an empty response.
pub fn get_hierarchy_data(
    data: &ProjectData,
    option: &str,
    hierarchy_type: &str,
) -> HierarchyResponse {
    let filter = StatusFilter::parse(option).unwrap_or_else(|| {
        warn!(option, "unknown status filter, showing all devices");
        StatusFilter::All
    });
    match HierarchyType::parse(hierarchy_type) {
        Some(kind) => hierarchy(data, filter, kind),
        None => {
            warn!(hierarchy_type, "unknown hierarchy type");
            HierarchyResponse::default()
        }
    }
}

// --- Edge maintenance ---

/// Devices below `root` following non-deleted edges of either kind, the same
/// edges the control hierarchy is built from.
fn descendants(data: &ProjectData, root: Uuid) -> HashSet<Uuid> {
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([root]);
    while let Some(id) = queue.pop_front() {
        for edge in data
            .control_edges
            .iter()
            .filter(|e| !e.is_deleted && e.parent_device_id == id)
        {
            if seen.insert(edge.child_device_id) {
                queue.push_back(edge.child_device_id);
            }
        }
    }
    seen
}

/// Replace the `kind` parent of `child`. `None` detaches the device.
///
/// Every earlier non-deleted edge of that kind is soft-deleted, so a device
/// never has more than one parent per kind in the control hierarchy.
pub fn set_device_parent(
    data: &mut ProjectData,
    child: Uuid,
    parent: Option<Uuid>,
    kind: ParentKind,
) -> ApiResponse<()> {
    if data.device(child).is_none() {
        return ApiResponse::not_found(format!("Device '{}' not found", child));
    }
    if let Some(parent) = parent {
        if parent == child {
            return ApiResponse::bad_request("A device cannot be its own parent");
        }
        if data.device(parent).is_none() {
            return ApiResponse::not_found(format!("Device '{}' not found", parent));
        }
        if descendants(data, child).contains(&parent) {
            warn!(%child, %parent, "rejected parent change that would create a cycle");
            return ApiResponse::bad_request(format!(
                "Device '{}' is below '{}' in the hierarchy",
                parent, child
            ));
        }
    }

    let current: Vec<&ControlEdge> = data
        .control_edges
        .iter()
        .filter(|e| !e.is_deleted && e.child_device_id == child && e.kind == kind)
        .collect();
    let unchanged = match (current.as_slice(), parent) {
        ([], None) => true,
        ([edge], Some(parent)) => edge.is_live() && edge.parent_device_id == parent,
        _ => false,
    };
    if unchanged {
        return ApiResponse::done("Parent unchanged");
    }

    for edge in data
        .control_edges
        .iter_mut()
        .filter(|e| !e.is_deleted && e.child_device_id == child && e.kind == kind)
    {
        edge.is_active = false;
        edge.is_deleted = true;
    }
    match parent {
        Some(parent) => {
            data.control_edges.push(ControlEdge::new(parent, child, kind));
            ApiResponse::done("Parent updated")
        }
        None => ApiResponse::done("Parent removed"),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeViolation {
    pub child_device_id: Uuid,
    pub kind: ParentKind,
    pub edge_ids: Vec<Uuid>,
}

/// Children holding more than one live edge of the same kind.
pub fn edge_violations(data: &ProjectData) -> Vec<EdgeViolation> {
    let mut by_child: BTreeMap<(Uuid, ParentKind), Vec<Uuid>> = BTreeMap::new();
    for edge in data.control_edges.iter().filter(|e| e.is_live()) {
        by_child
            .entry((edge.child_device_id, edge.kind))
            .or_default()
            .push(edge.id);
    }
    by_child
        .into_iter()
        .filter(|(_, ids)| ids.len() > 1)
        .map(|((child_device_id, kind), edge_ids)| EdgeViolation {
            child_device_id,
            kind,
            edge_ids,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Project, SubSystem, System, Tag, WorkAreaPack};

    fn entry(name: &'static str, is_active: bool) -> DeviceEntry<'static> {
        DeviceEntry {
            id: Uuid::new_v4(),
            name,
            is_active,
        }
    }

    fn edge(parent: &DeviceEntry, child: &DeviceEntry, kind: ParentKind) -> ControlEdge {
        ControlEdge::new(parent.id, child.id, kind)
    }

    fn not_attached(tree: &[HierarchyNode]) -> Option<&HierarchyNode> {
        tree.iter().find(|n| n.id.is_nil())
    }

    fn all_nodes(nodes: &[HierarchyNode]) -> Vec<&HierarchyNode> {
        let mut out = Vec::new();
        for n in nodes {
            out.push(n);
            out.extend(all_nodes(&n.children_list));
        }
        out
    }

    #[test]
    fn connection_child_is_nested_under_parent() {
        let p = entry("P", true);
        let d = entry("D", true);
        let edges = vec![edge(&p, &d, ParentKind::Connection)];

        let tree = control_hierarchy(&[p, d], &edges, StatusFilter::All);

        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].id, p.id);
        let child = &tree[0].children_list[0];
        assert_eq!(child.id, d.id);
        assert!(!child.instrument);
        assert!(not_attached(&tree).is_none());
    }

    #[test]
    fn isolated_device_lands_in_not_attached_folder() {
        let p = entry("P", true);
        let d = entry("D", true);
        let e = entry("E", true);
        let edges = vec![edge(&p, &d, ParentKind::Connection)];

        let tree = control_hierarchy(&[p, d, e], &edges, StatusFilter::All);

        let folder = not_attached(&tree).expect("not attached folder");
        assert!(folder.is_folder);
        assert_eq!(folder.name, NOT_ATTACHED);
        assert_eq!(folder.children_list.len(), 1);
        assert_eq!(folder.children_list[0].id, e.id);
    }

    #[test]
    fn instrument_only_parent_is_not_attached_but_keeps_children() {
        let p = entry("P", true);
        let i = entry("I", true);
        let edges = vec![edge(&p, &i, ParentKind::Instrument)];

        let tree = control_hierarchy(&[p, i], &edges, StatusFilter::All);

        assert_eq!(tree.len(), 1);
        let folder = not_attached(&tree).unwrap();
        assert_eq!(folder.children_list[0].id, p.id);
        let instrument = &folder.children_list[0].children_list[0];
        assert_eq!(instrument.id, i.id);
        assert!(instrument.instrument);
    }

    #[test]
    fn instrument_flag_follows_any_inbound_instrument_edge() {
        let p = entry("P", true);
        let q = entry("Q", true);
        let d = entry("D", true);
        let edges = vec![
            edge(&p, &d, ParentKind::Connection),
            edge(&q, &d, ParentKind::Instrument),
        ];

        let tree = control_hierarchy(&[p, q, d], &edges, StatusFilter::All);

        let under_p = tree[0].find(d.id).unwrap();
        assert_eq!(tree[0].id, p.id);
        assert!(under_p.instrument);
        let under_q = not_attached(&tree).unwrap().find(d.id).unwrap();
        assert!(under_q.instrument);
        assert!(!tree[0].instrument);
    }

    #[test]
    fn inactive_edges_still_nest_but_deleted_edges_do_not() {
        let p = entry("P", true);
        let d = entry("D", true);
        let e = entry("E", true);
        let mut inactive = edge(&p, &d, ParentKind::Connection);
        inactive.is_active = false;
        let mut gone = edge(&p, &e, ParentKind::Connection);
        gone.is_deleted = true;

        let tree = control_hierarchy(&[p, d, e], &[inactive, gone], StatusFilter::All);

        assert_eq!(tree[0].id, p.id);
        assert_eq!(tree[0].children_list.len(), 1);
        assert_eq!(tree[0].children_list[0].id, d.id);
        let folder = not_attached(&tree).unwrap();
        assert_eq!(folder.children_list.len(), 1);
        assert_eq!(folder.children_list[0].id, e.id);
    }

    #[test]
    fn building_twice_gives_the_same_tree() {
        let a = entry("A", true);
        let b = entry("B", false);
        let c = entry("C", true);
        let d = entry("D", true);
        let edges = vec![
            edge(&a, &b, ParentKind::Connection),
            edge(&b, &c, ParentKind::Connection),
            edge(&a, &d, ParentKind::Instrument),
        ];
        let devices = [a, b, c, d];

        let first = control_hierarchy(&devices, &edges, StatusFilter::All);
        let second = control_hierarchy(&devices, &edges, StatusFilter::All);
        assert_eq!(first, second);
    }

    #[test]
    fn cycles_are_truncated_and_surfaced() {
        let a = entry("A", true);
        let b = entry("B", true);
        let edges = vec![
            edge(&a, &b, ParentKind::Connection),
            edge(&b, &a, ParentKind::Connection),
        ];

        let tree = control_hierarchy(&[a, b], &edges, StatusFilter::All);

        let folder = not_attached(&tree).unwrap();
        assert_eq!(folder.children_list.len(), 1);
        let top = &folder.children_list[0];
        assert_eq!(top.id, a.id);
        assert_eq!(top.children_list[0].id, b.id);
        assert!(top.children_list[0].children_list.is_empty());
    }

    #[test]
    fn cycle_below_a_root_stops_at_the_repeat() {
        let r = entry("R", true);
        let a = entry("A", true);
        let b = entry("B", true);
        let edges = vec![
            edge(&r, &a, ParentKind::Connection),
            edge(&a, &b, ParentKind::Connection),
            edge(&b, &a, ParentKind::Connection),
        ];

        let tree = control_hierarchy(&[r, a, b], &edges, StatusFilter::All);

        assert_eq!(tree.len(), 1);
        let b_node = tree[0].find(b.id).unwrap();
        assert!(b_node.children_list.is_empty());
    }

    fn mixed_tree() -> (Vec<DeviceEntry<'static>>, Vec<ControlEdge>) {
        let root = entry("root", true);
        let off = entry("off", false);
        let below_off = entry("below-off", true);
        let on = entry("on", true);
        let deep_off = entry("deep-off", false);
        let lone_off = entry("lone-off", false);
        let lone_on = entry("lone-on", true);
        let edges = vec![
            edge(&root, &off, ParentKind::Connection),
            edge(&off, &below_off, ParentKind::Connection),
            edge(&root, &on, ParentKind::Connection),
            edge(&on, &deep_off, ParentKind::Instrument),
        ];
        (
            vec![root, off, below_off, on, deep_off, lone_off, lone_on],
            edges,
        )
    }

    #[test]
    fn active_filter_removes_every_inactive_node() {
        let (devices, edges) = mixed_tree();
        let tree = control_hierarchy(&devices, &edges, StatusFilter::Active);

        let nodes = all_nodes(&tree);
        assert!(nodes.iter().all(|n| n.is_active));
        assert!(nodes.iter().any(|n| n.name == "on"));
        assert!(nodes.iter().all(|n| n.name != "below-off"));
        assert_eq!(not_attached(&tree).unwrap().children_list.len(), 1);
    }

    #[test]
    fn active_filter_keeps_the_tree_shape_around_removed_devices() {
        let lone_off = entry("lone-off", false);
        let tree = control_hierarchy(&[lone_off], &[], StatusFilter::Active);
        assert_eq!(tree.len(), 1);
        let folder = not_attached(&tree).unwrap();
        assert!(folder.is_folder);
        assert!(folder.children_list.is_empty());
    }

    #[test]
    fn inactive_filter_keeps_only_paths_to_inactive_nodes() {
        let (devices, edges) = mixed_tree();
        let tree = control_hierarchy(&devices, &edges, StatusFilter::Inactive);

        for node in all_nodes(&tree) {
            assert!(node.contains_inactive(), "{} has no inactive node", node.name);
        }
        let names: Vec<&str> = all_nodes(&tree).iter().map(|n| n.name.as_str()).collect();
        assert!(names.contains(&"off"));
        assert!(names.contains(&"deep-off"));
        assert!(names.contains(&"lone-off"));
        assert!(!names.contains(&"lone-on"));
        assert!(!names.contains(&"below-off"));
    }

    #[test]
    fn inactive_filter_drops_folder_without_inactive_devices() {
        let lone_on = entry("lone-on", true);
        let tree = control_hierarchy(&[lone_on], &[], StatusFilter::Inactive);
        assert!(tree.is_empty());
    }

    fn ccmd_project() -> (ProjectData, Uuid, Uuid) {
        let mut data = ProjectData::new(Project {
            id: Uuid::new_v4(),
            name: "Plant".into(),
            tag_fields: None,
        });
        let pid = data.project.id;
        let pack = WorkAreaPack {
            id: Uuid::new_v4(),
            project_id: pid,
            number: "WAP-1".into(),
            description: String::new(),
            is_deleted: false,
        };
        let system = System {
            id: Uuid::new_v4(),
            work_area_pack_id: pack.id,
            number: "SYS-1".into(),
            is_deleted: false,
        };
        let empty_system = System {
            id: Uuid::new_v4(),
            work_area_pack_id: pack.id,
            number: "SYS-2".into(),
            is_deleted: false,
        };
        let sub = SubSystem {
            id: Uuid::new_v4(),
            system_id: system.id,
            number: "SUB-1".into(),
            is_deleted: false,
        };
        let tag = Tag::new(pid, "FT-101");

        let mut active = Device::new(pid, Some(tag.id));
        active.is_instrument = "Y".into();
        active.sub_system_id = Some(sub.id);
        let mut inactive = Device::new(pid, None);
        inactive.is_instrument = "N".into();
        inactive.is_active = false;
        inactive.sub_system_id = Some(sub.id);
        let mut unclassified = Device::new(pid, None);
        unclassified.sub_system_id = Some(sub.id);

        let (active_id, inactive_id) = (active.id, inactive.id);
        data.tags.push(tag);
        data.work_area_packs.push(pack);
        data.systems.extend([system, empty_system]);
        data.sub_systems.push(sub);
        data.devices.extend([active, inactive, unclassified]);
        (data, active_id, inactive_id)
    }

    #[test]
    fn ccmd_tree_has_fixed_depth_and_prunes_empty_systems() {
        let (data, active_id, inactive_id) = ccmd_project();
        let tree = ccmd_hierarchy(&data, StatusFilter::All);

        assert_eq!(tree.len(), 1);
        let pack = &tree[0];
        assert!(pack.is_folder);
        assert_eq!(pack.children_list.len(), 1, "SYS-2 has no devices");
        let sub = &pack.children_list[0].children_list[0];
        assert_eq!(sub.name, "SUB-1");
        let ids: Vec<Uuid> = sub.children_list.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![active_id, inactive_id]);
        assert_eq!(sub.children_list[0].name, "FT-101");
        assert!(sub.children_list[0].instrument);
    }

    #[test]
    fn ccmd_filter_compares_device_status_only() {
        let (data, active_id, inactive_id) = ccmd_project();

        let active = ccmd_hierarchy(&data, StatusFilter::Active);
        let leaves = &active[0].children_list[0].children_list[0].children_list;
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].id, active_id);

        let inactive = ccmd_hierarchy(&data, StatusFilter::Inactive);
        let leaves = &inactive[0].children_list[0].children_list[0].children_list;
        assert_eq!(leaves[0].id, inactive_id);
    }

    #[test]
    fn ccmd_keeps_work_area_pack_without_matches() {
        let (mut data, _, _) = ccmd_project();
        for d in &mut data.devices {
            d.is_active = true;
        }
        let tree = ccmd_hierarchy(&data, StatusFilter::Inactive);
        assert_eq!(tree.len(), 1);
        assert!(tree[0].children_list.is_empty());
    }

    #[test]
    fn unknown_hierarchy_type_is_empty() {
        let (data, _, _) = ccmd_project();
        let resp = get_hierarchy_data(&data, "All", "Electrical");
        assert!(resp.device_list.is_empty());
        assert!(resp.tag_list.is_empty());

        let resp = get_hierarchy_data(&data, "whatever", "CCMD");
        assert_eq!(resp.device_list.len(), 1);
        assert_eq!(resp.tag_list.len(), 1);
    }

    fn device_project(n: usize) -> (ProjectData, Vec<Uuid>) {
        let mut data = ProjectData::new(Project {
            id: Uuid::new_v4(),
            name: "Plant".into(),
            tag_fields: None,
        });
        let ids = (0..n)
            .map(|_| {
                let d = Device::new(data.project.id, None);
                let id = d.id;
                data.devices.push(d);
                id
            })
            .collect();
        (data, ids)
    }

    #[test]
    fn setting_a_parent_replaces_the_previous_one() {
        let (mut data, ids) = device_project(3);
        let (p1, p2, child) = (ids[0], ids[1], ids[2]);

        assert!(set_device_parent(&mut data, child, Some(p1), ParentKind::Connection).is_succeeded);
        assert!(set_device_parent(&mut data, child, Some(p2), ParentKind::Connection).is_succeeded);
        assert!(set_device_parent(&mut data, child, Some(p1), ParentKind::Instrument).is_succeeded);

        let live: Vec<&ControlEdge> = data.control_edges.iter().filter(|e| e.is_live()).collect();
        assert_eq!(live.len(), 2);
        assert!(live
            .iter()
            .any(|e| e.parent_device_id == p2 && e.kind == ParentKind::Connection));
        assert!(edge_violations(&data).is_empty());

        let unchanged = set_device_parent(&mut data, child, Some(p2), ParentKind::Connection);
        assert_eq!(unchanged.message, "Parent unchanged");

        assert!(set_device_parent(&mut data, child, None, ParentKind::Connection).is_succeeded);
        assert_eq!(data.control_edges.iter().filter(|e| e.is_live()).count(), 1);
        let connection: Vec<&ControlEdge> = data
            .control_edges
            .iter()
            .filter(|e| e.kind == ParentKind::Connection)
            .collect();
        assert_eq!(connection.len(), 2);
        assert!(connection.iter().all(|e| e.is_deleted));
    }

    #[test]
    fn replaced_parent_leaves_the_control_tree() {
        let (mut data, ids) = device_project(3);
        let (p1, p2, child) = (ids[0], ids[1], ids[2]);
        let mut stale = ControlEdge::new(p1, child, ParentKind::Connection);
        stale.is_active = false;
        data.control_edges.push(stale);

        let resp = set_device_parent(&mut data, child, Some(p2), ParentKind::Connection);
        assert_eq!(resp.message, "Parent updated");

        let devices = device_entries(&data);
        let tree = control_hierarchy(&devices, &data.control_edges, StatusFilter::All);
        let parents: Vec<Uuid> = tree
            .iter()
            .filter(|n| n.find(child).is_some() && !n.is_folder)
            .map(|n| n.id)
            .collect();
        assert_eq!(parents, vec![p2]);
    }

    #[test]
    fn parent_changes_that_would_loop_are_rejected() {
        let (mut data, ids) = device_project(3);
        let (a, b, c) = (ids[0], ids[1], ids[2]);
        set_device_parent(&mut data, b, Some(a), ParentKind::Connection);
        set_device_parent(&mut data, c, Some(b), ParentKind::Instrument);

        assert_eq!(
            set_device_parent(&mut data, a, Some(c), ParentKind::Connection).status_code,
            400
        );
        assert_eq!(
            set_device_parent(&mut data, a, Some(a), ParentKind::Connection).status_code,
            400
        );
        assert_eq!(
            set_device_parent(&mut data, a, Some(Uuid::new_v4()), ParentKind::Connection)
                .status_code,
            404
        );
    }

    #[test]
    fn duplicate_live_edges_are_reported() {
        let (mut data, ids) = device_project(3);
        data.control_edges
            .push(ControlEdge::new(ids[0], ids[2], ParentKind::Connection));
        data.control_edges
            .push(ControlEdge::new(ids[1], ids[2], ParentKind::Connection));
        data.control_edges
            .push(ControlEdge::new(ids[1], ids[2], ParentKind::Instrument));

        let violations = edge_violations(&data);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].child_device_id, ids[2]);
        assert_eq!(violations[0].kind, ParentKind::Connection);
        assert_eq!(violations[0].edge_ids.len(), 2);
    }
}
