use openlabel::{
    Attribute, AttributeKind, Document, DocumentConfig, ElementArgs, ElementKind, Extrinsics,
    IntrinsicsFisheye, IntrinsicsPinhole, Odometry, RdfRole, StreamProperties, StreamSync, StreamType,
    Uid, UuidSource,
};
use serde_json::json;

#[derive(Debug, Default)]
struct SequentialUuids(u64);

impl UuidSource for SequentialUuids {
    fn next_uuid(&mut self) -> String {
        self.0 += 1;
        format!("{:08x}-0000-4000-8000-000000000000", self.0)
    }
}

#[test]
fn static_object_with_head_box() {
    let mut doc = Document::new();
    let marcos = doc.add_object("marcos", ElementArgs::new().semantic_type("person"), None);
    doc.add_object_data(&marcos, Attribute::bbox("head", [10.0, 10.0, 30.0, 30.0]), None)
        .unwrap();

    let tree = doc.to_tree();
    let node = &tree["openlabel"]["objects"]["0"];
    assert_eq!(node["name"], json!("marcos"));
    assert_eq!(node["type"], json!("person"));
    assert!(node.get("frame_intervals").is_none());

    let boxes = node["object_data"]["bbox"].as_array().unwrap();
    assert_eq!(boxes.len(), 1);
    assert_eq!(boxes[0]["name"], json!("head"));
    assert!(tree["openlabel"].get("frames").is_none());
}

#[test]
fn gapped_objects_and_late_rewrite() {
    let mut doc = Document::new();
    let a = doc.add_object("A", ElementArgs::new(), Some(0));
    for f in [1, 2, 5] {
        doc.add_object("A", ElementArgs::new().uid(a.clone()), Some(f));
    }
    let b = doc.add_object("B", ElementArgs::new(), Some(7));
    for f in [8, 9] {
        doc.add_object("B", ElementArgs::new().uid(b.clone()), Some(f));
    }
    doc.add_object("A", ElementArgs::new().uid(a.clone()), Some(5));
    doc.add_object("A", ElementArgs::new().uid(a.clone()), Some(5));

    let tree = doc.to_tree();
    assert_eq!(
        tree["openlabel"]["objects"]["0"]["frame_intervals"],
        json!([{"frame_start": 0, "frame_end": 2}, {"frame_start": 5, "frame_end": 5}])
    );
    assert_eq!(
        tree["openlabel"]["frame_intervals"],
        json!([{"frame_start": 0, "frame_end": 9}])
    );
    assert!(doc.get_frame(5).unwrap().contains(ElementKind::Object, &a));
    assert!(!doc.get_frame(3).unwrap().contains(ElementKind::Object, &a));
}

#[test]
fn attribute_replace_keeps_position() {
    let mut doc = Document::new();
    let car = doc.add_object("car", ElementArgs::new(), Some(0));
    for (name, v) in [("speed", 1.0), ("heading", 0.5), ("speed", 2.0)] {
        doc.add_object_data(&car, Attribute::num(name, v), Some(0)).unwrap();
    }
    let slot = doc.get_frame(0).unwrap().element(ElementKind::Object, &car).unwrap();
    let nums = slot.data.of_kind(AttributeKind::Num);
    assert_eq!(nums.len(), 2);
    assert_eq!(nums[0].name, "speed");
    assert_eq!(nums[0].value.as_num(), Some(2.0));
    assert_eq!(nums[1].name, "heading");
}

#[test]
fn explicit_uids_drive_counters() {
    let mut doc = Document::new();
    assert_eq!(doc.add_event("start", ElementArgs::new().uid(5), None), Uid::Integer(5));
    assert_eq!(doc.last_uid(ElementKind::Event), Some(5));
    assert_eq!(doc.add_event("again", ElementArgs::new().uid(3), None), Uid::Integer(3));
    assert_eq!(doc.last_uid(ElementKind::Event), Some(5));
    assert_eq!(doc.add_event("next", ElementArgs::new(), None), Uid::Integer(6));
    // Other kinds keep their own counter.
    assert_eq!(doc.add_action("walk", ElementArgs::new(), None), Uid::Integer(0));
}

#[test]
fn uuid_mode_latches_across_kinds() {
    let mut doc =
        Document::with_uuid_source(DocumentConfig::default(), Box::new(SequentialUuids::default()))
            .unwrap();
    assert!(!doc.uses_uuid());
    doc.declare_str(
        ElementKind::Context,
        "scene",
        "d1f0c9a6-5f5e-4c2b-9a4c-1e2f3a4b5c6d",
        ElementArgs::new(),
        None,
    )
    .unwrap();

    for kind in ElementKind::ALL {
        let uid = doc.declare(kind, "auto", ElementArgs::new(), None);
        assert!(uid.is_uuid(), "{kind} got {uid}");
    }
    assert_eq!(doc.last_uid(ElementKind::Object), None);
}

#[test]
fn uuid_config_starts_latched() {
    let config = DocumentConfig {
        use_uuid: true,
        ..DocumentConfig::default()
    };
    let mut doc = Document::with_config(config).unwrap();
    assert!(doc.add_object("x", ElementArgs::new(), None).is_uuid());
}

#[test]
fn holistic_context_is_stamped_into_backfilled_frames() {
    let mut doc = Document::new();
    let car = doc.add_object("car", ElementArgs::new(), Some(0));
    let weather = doc.add_context("weather", ElementArgs::new(), None);
    assert!(doc.is_holistic(ElementKind::Context, &weather));

    doc.add_object_data(&car, Attribute::bbox("shape", [0.0, 0.0, 1.0, 1.0]), Some(6))
        .unwrap();
    assert_eq!(doc.frame_count(), 7);
    for f in 0..=6 {
        let frame = doc.get_frame(f).unwrap();
        assert!(frame.contains(ElementKind::Context, &weather), "frame {f}");
    }
    assert_eq!(
        doc.element_frame_intervals(ElementKind::Context, &weather).unwrap().to_pairs(),
        vec![(0, 6)]
    );
    // The car was only written at 0 and 6.
    assert_eq!(
        doc.element_frame_intervals(ElementKind::Object, &car).unwrap().to_pairs(),
        vec![(0, 0), (6, 6)]
    );
}

#[test]
fn static_context_redeclared_after_first_frame_follows_the_timeline() {
    let mut doc = Document::new();
    let scene = doc.add_context("scene", ElementArgs::new(), None);
    let car = doc.add_object("car", ElementArgs::new(), Some(0));
    assert!(!doc.is_holistic(ElementKind::Context, &scene));

    doc.add_context("scene", ElementArgs::new().uid(scene.clone()), None);
    assert!(doc.is_holistic(ElementKind::Context, &scene));

    doc.add_object_data(&car, Attribute::num("speed", 3.0), Some(3)).unwrap();
    for f in 0..=3 {
        let frame = doc.get_frame(f).unwrap();
        assert!(frame.contains(ElementKind::Context, &scene), "frame {f}");
    }
    assert_eq!(
        doc.element_frame_intervals(ElementKind::Context, &scene).unwrap().to_pairs(),
        vec![(0, 3)]
    );
    assert_eq!(doc.get_element(ElementKind::Context, &scene).unwrap().name, "scene");
}

fn identity_pose() -> Vec<f64> {
    (0..16).map(|i| if i % 5 == 0 { 1.0 } else { 0.0 }).collect()
}

#[test]
fn camera_rig_with_sync_and_odometry() {
    let mut doc = Document::new();
    doc.add_coordinate_system("odom", "scene_cs", None, None).unwrap();
    doc.add_stream("CAM_FRONT", "./front.mp4", "front camera", StreamType::Camera);
    doc.add_stream("CAM_FISHEYE", "", "", "camera");
    doc.add_stream("VELO", "./velo.pcd", "roof lidar", StreamType::Lidar);

    let matrix = vec![1000.0, 0.0, 960.0, 0.0, 0.0, 1000.0, 540.0, 0.0, 0.0, 0.0, 1.0, 0.0];
    let pinhole = IntrinsicsPinhole::new(1920, 1080, matrix, vec![0.1, -0.05, 0.0, 0.0, 0.01]).unwrap();
    doc.add_stream_properties(
        "CAM_FRONT",
        StreamProperties::new()
            .intrinsics(pinhole)
            .extrinsics(Extrinsics::new(identity_pose()).unwrap())
            .sync(StreamSync::shift(1)),
    )
    .unwrap();
    let fisheye = IntrinsicsFisheye::new(1280, 966, [0.3, 0.0, 0.0, 0.0], 190.0, (640.0, 483.0), (500.0, 500.0))
        .unwrap();
    doc.add_stream_properties("CAM_FISHEYE", StreamProperties::new().intrinsics(fisheye))
        .unwrap();

    let car = doc.add_object("car", ElementArgs::new(), Some(0));
    for f in 0..3u64 {
        doc.add_object_data(&car, Attribute::bbox("shape", [0.0, 0.0, 10.0, 10.0]), Some(f))
            .unwrap();
        let ts = format!("2021-06-01T08:30:0{f}Z").parse().unwrap();
        let sync = StreamSync::at_frame(f).frame_stream(f + 100).timestamp(ts);
        doc.add_stream_properties("VELO", StreamProperties::new().sync(sync)).unwrap();
        doc.add_odometry(f, Odometry::new(identity_pose()).unwrap()).unwrap();
    }

    let tree = doc.to_tree();
    let root = &tree["openlabel"];
    let front = &root["streams"]["CAM_FRONT"]["stream_properties"];
    assert_eq!(front["intrinsics_pinhole"]["width_px"], json!(1920));
    assert_eq!(front["intrinsics_pinhole"]["distortion_coeffs_1xN"].as_array().unwrap().len(), 5);
    assert_eq!(front["sync"], json!({"frame_shift": 1}));
    assert_eq!(
        root["streams"]["CAM_FISHEYE"]["stream_properties"]["intrinsics_fisheye"]["fov_deg"],
        json!(190.0)
    );
    assert!(root["streams"]["VELO"].get("stream_properties").is_none());
    let velo = &root["frames"]["2"]["frame_properties"]["streams"]["VELO"]["stream_properties"]["sync"];
    assert_eq!(velo, &json!({"frame_stream": 102, "timestamp": "2021-06-01T08:30:02Z"}));
    assert_eq!(
        root["frames"]["1"]["frame_properties"]["odometry"]["pose_lcs_wrt_wcs_4x4"][0],
        json!(1.0)
    );
    assert_eq!(doc.current_frame(), Some(2));

    // Frame export carries the frame's properties and complete objects.
    let frame = doc.frame_to_tree(1, false).unwrap();
    assert_eq!(frame["objects"]["0"]["name"], json!("car"));
    assert_eq!(frame["frame_properties"]["streams"]["VELO"]["stream_properties"]["sync"]["frame_stream"], json!(101));
    assert!(doc.has_frame_data_name(ElementKind::Object, 1, "shape", Some(&car)));

    let reloaded = Document::from_tree(&tree).unwrap();
    assert_eq!(reloaded.to_tree(), tree);
    assert_eq!(
        reloaded.frame_stream_properties(2, "VELO").and_then(|p| p.sync.as_ref()).and_then(|s| s.frame_stream),
        Some(102)
    );
    assert!(reloaded.odometry(0).is_some());
}

#[test]
fn relation_links_and_frame_presence() {
    let mut doc = Document::new();
    let ped = doc.add_object("pedestrian", ElementArgs::new(), Some(3));
    let walk = doc.add_action("walking", ElementArgs::new(), Some(3));
    let rel = doc.add_relation("performs", ElementArgs::new().semantic_type("performs"), Some(3));
    doc.add_rdf(&rel, RdfRole::Subject, ElementKind::Object, &ped).unwrap();
    doc.add_rdf(&rel, RdfRole::Object, ElementKind::Action, &walk).unwrap();

    let tree = doc.to_tree();
    assert_eq!(
        tree["openlabel"]["relations"]["0"]["rdf_objects"],
        json!([{"uid": "0", "type": "action"}])
    );
    assert!(doc.is_relation_at_frame(&rel, 3));

    let err = doc
        .add_rdf(&Uid::Integer(8), RdfRole::Subject, ElementKind::Object, &ped)
        .unwrap_err();
    assert!(err.is_soft());
}

#[test]
fn relation_without_links_still_has_rdf_lists() {
    let mut doc = Document::new();
    doc.add_relation("empty", ElementArgs::new(), None);
    let tree = doc.to_tree();
    assert_eq!(tree["openlabel"]["relations"]["0"]["rdf_subjects"], json!([]));
    assert_eq!(tree["openlabel"]["relations"]["0"]["rdf_objects"], json!([]));
}

#[test]
fn registries_and_geometry_in_coordinate_systems() {
    let mut doc = Document::new();
    let identity: Vec<f64> = (0..16).map(|i| if i % 5 == 0 { 1.0 } else { 0.0 }).collect();
    doc.add_coordinate_system("odom", "scene_cs", None, None).unwrap();
    doc.add_coordinate_system("vehicle-iso8855", "local_cs", Some("odom"), Some(identity))
        .unwrap();
    doc.add_coordinate_system("camera", "sensor_cs", Some("vehicle-iso8855"), None)
        .unwrap();
    assert!(doc
        .add_coordinate_system("lidar", "sensor_cs", None, Some(vec![0.0; 12]))
        .unwrap_err()
        .is_validation());

    let car = doc.add_object("car", ElementArgs::new().coordinate_system("vehicle-iso8855"), Some(0));
    let cuboid = Attribute::cuboid("box3d", vec![1.0, 2.0, 0.5, 0.0, 0.0, 0.3, 4.2, 1.8, 1.5])
        .unwrap()
        .in_coordinate_system("vehicle-iso8855");
    doc.add_object_data(&car, cuboid, Some(0)).unwrap();

    let tree = doc.to_tree();
    let cs = &tree["openlabel"]["coordinate_systems"];
    assert_eq!(cs["odom"]["children"], json!(["vehicle-iso8855"]));
    assert_eq!(cs["vehicle-iso8855"]["children"], json!(["camera"]));
    assert_eq!(cs["vehicle-iso8855"]["pose_wrt_parent"].as_array().unwrap().len(), 16);
    assert_eq!(
        tree["openlabel"]["frames"]["0"]["objects"]["0"]["object_data"]["cuboid"][0]["coordinate_system"],
        json!("vehicle-iso8855")
    );
    assert_eq!(
        tree["openlabel"]["objects"]["0"]["coordinate_system"],
        json!("vehicle-iso8855")
    );
}

#[test]
fn polygon_chain_code_attribute() {
    let mut doc = Document::new();
    let lane = doc.add_object("lane", ElementArgs::new(), Some(0));
    let coords = [5, 5, 10, 5, 11, 6, 11, 8, 9, 10, 5, 10, 3, 8, 3, 6, 4, 5];
    let poly = Attribute::poly2d_srf6dcc("contour", &coords, true).unwrap();
    doc.add_object_data(&lane, poly, Some(0)).unwrap();

    let tree = doc.to_tree();
    let node = &tree["openlabel"]["frames"]["0"]["objects"]["0"]["object_data"]["poly2d"][0];
    assert_eq!(node["mode"], json!("MODE_POLY2D_SRF6DCC"));
    assert_eq!(node["val"][0], json!("5"));
    assert_eq!(node["val"][1], json!("5"));

    let rest: usize = node["val"][2].as_str().unwrap().parse().unwrap();
    let decoded =
        openlabel::unpack_chain_code(node["val"][3].as_str().unwrap(), 3, rest).unwrap();
    assert_eq!(decoded, openlabel::compute_srf6dcc(&coords).distances);
}
