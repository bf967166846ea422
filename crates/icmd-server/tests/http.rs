use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use icmd_core::{
    ControlEdge, Device, LookupEntity, ParentKind, Project, ProjectData, ProjectTagFieldConfig,
    Store, Tag, TagFieldConfig, TagFieldSource,
};
use icmd_server::{router, AppState};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

struct Fixture {
    _dir: tempfile::TempDir,
    store: Store,
    data: ProjectData,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::new(dir.path());
    let config = ProjectTagFieldConfig::new([
        TagFieldConfig::new(TagFieldSource::Process, "-"),
        TagFieldConfig::new(TagFieldSource::SubProcess, "-"),
        TagFieldConfig::new(TagFieldSource::NotUsed, ""),
        TagFieldConfig::new(TagFieldSource::HandTyped, ""),
        TagFieldConfig::new(TagFieldSource::NotUsed, ""),
        TagFieldConfig::new(TagFieldSource::NotUsed, ""),
    ]);
    let mut data = ProjectData::new(Project {
        id: Uuid::new_v4(),
        name: "North Unit".into(),
        tag_fields: Some(config),
    });
    data.processes.push(LookupEntity::new("A100"));
    data.sub_processes.push(LookupEntity::new("B2"));
    store.write_project(&data).unwrap();
    Fixture {
        _dir: dir,
        store,
        data,
    }
}

fn app(store: &Store) -> Router {
    router(AppState::new(store.clone()))
}

async fn call(app: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(b) => builder
            .header("content-type", "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let val = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, val)
}

#[tokio::test]
async fn generate_tag_joins_resolved_fields() {
    let f = fixture();
    let body = json!({
        "projectId": f.data.project.id,
        "field1Id": f.data.processes[0].id.to_string(),
        "field2Id": f.data.sub_processes[0].id.to_string(),
        "field4Id": "X",
    });

    let (status, val) = call(app(&f.store), Method::POST, "/Tag/GenerateTag", Some(body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(val["isSucceeded"], true);
    assert_eq!(val["data"]["tag"], "A100-B2-X");
}

#[tokio::test]
async fn unknown_project_is_404() {
    let f = fixture();
    let body = json!({ "projectId": Uuid::new_v4() });
    let (status, val) = call(app(&f.store), Method::POST, "/Tag/GenerateTag", Some(body)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(val["isSucceeded"], false);
}

#[tokio::test]
async fn duplicate_tag_names_are_a_conflict_not_an_error() {
    let f = fixture();
    let pid = f.data.project.id;
    let body = json!({ "projectId": pid, "tagName": "FT-101", "field4Id": "X" });

    let (_, created) = call(
        app(&f.store),
        Method::POST,
        "/Tag/CreateOrEditTag",
        Some(body.clone()),
    )
    .await;
    assert_eq!(created["isSucceeded"], true);
    let id = created["data"]["id"].as_str().unwrap().to_string();

    let dup = json!({ "projectId": pid, "tagName": " ft-101 " });
    let (status, val) = call(app(&f.store), Method::POST, "/Tag/CreateOrEditTag", Some(dup)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(val["isSucceeded"], false);
    assert_eq!(val["statusCode"], 409);

    let (_, info) = call(
        app(&f.store),
        Method::GET,
        &format!("/Tag/GetTag/{}/{}", pid, id),
        None,
    )
    .await;
    assert_eq!(info["data"]["tagName"], "FT-101");
    assert_eq!(info["data"]["fields"].as_array().unwrap().len(), 6);
}

#[tokio::test]
async fn delete_is_refused_while_a_device_uses_the_tag() {
    let mut f = fixture();
    let tag = Tag::new(f.data.project.id, "PT-7");
    let tag_id = tag.id;
    f.data.tags.push(tag);
    f.data.devices.push(Device::new(f.data.project.id, Some(tag_id)));
    f.store.write_project(&f.data).unwrap();
    let uri = format!("/Tag/DeleteTag/{}/{}", f.data.project.id, tag_id);

    let (_, val) = call(app(&f.store), Method::DELETE, &uri, None).await;
    assert_eq!(val["isSucceeded"], false);
    assert_eq!(val["statusCode"], 409);

    f.data.devices[0].is_deleted = true;
    f.store.write_project(&f.data).unwrap();
    let (_, val) = call(app(&f.store), Method::DELETE, &uri, None).await;
    assert_eq!(val["isSucceeded"], true);
    let stored = f.store.read_project(f.data.project.id).unwrap();
    assert!(stored.tags[0].is_deleted);
}

#[tokio::test]
async fn hierarchy_data_nests_children_and_buckets_the_rest() {
    let mut f = fixture();
    let pid = f.data.project.id;
    let parent = Device::new(pid, None);
    let child = Device::new(pid, None);
    let loose = Device::new(pid, None);
    f.data
        .control_edges
        .push(ControlEdge::new(parent.id, child.id, ParentKind::Connection));
    f.data.devices.extend([parent.clone(), child.clone(), loose.clone()]);
    f.store.write_project(&f.data).unwrap();

    let body = json!({ "projectId": pid, "option": "All", "hieararchyType": "Control" });
    let (status, val) = call(
        app(&f.store),
        Method::POST,
        "/Hierarchy/GetHierarchyData",
        Some(body),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let list = val["deviceList"].as_array().unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0]["id"], parent.id.to_string());
    assert_eq!(list[0]["childrenList"][0]["id"], child.id.to_string());
    assert_eq!(list[0]["childrenList"][0]["instrument"], false);
    assert_eq!(list[1]["id"], Uuid::nil().to_string());
    assert_eq!(list[1]["isFolder"], true);
    assert_eq!(list[1]["childrenList"][0]["id"], loose.id.to_string());
}

#[tokio::test]
async fn unknown_hierarchy_type_gives_an_empty_tree() {
    let f = fixture();
    let body = json!({ "projectId": f.data.project.id, "hieararchyType": "Wiring" });
    let (status, val) = call(
        app(&f.store),
        Method::POST,
        "/Hierarchy/GetHierarchyData",
        Some(body),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(val["deviceList"], json!([]));
}

#[tokio::test]
async fn set_parent_persists_and_replaces_the_old_edge() {
    let mut f = fixture();
    let pid = f.data.project.id;
    let a = Device::new(pid, None);
    let b = Device::new(pid, None);
    let c = Device::new(pid, None);
    f.data.devices.extend([a.clone(), b.clone(), c.clone()]);
    f.store.write_project(&f.data).unwrap();

    for parent in [a.id, b.id] {
        let body = json!({ "projectId": pid, "childDeviceId": c.id, "parentDeviceId": parent });
        let (_, val) = call(app(&f.store), Method::POST, "/Hierarchy/SetParent", Some(body)).await;
        assert_eq!(val["isSucceeded"], true);
    }

    let stored = f.store.read_project(pid).unwrap();
    let live: Vec<&ControlEdge> = stored.control_edges.iter().filter(|e| e.is_live()).collect();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].parent_device_id, b.id);

    let body = json!({ "projectId": pid, "childDeviceId": c.id, "parentDeviceId": c.id });
    let (_, val) = call(app(&f.store), Method::POST, "/Hierarchy/SetParent", Some(body)).await;
    assert_eq!(val["statusCode"], 400);
}
