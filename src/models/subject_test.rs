use super::*;

const SUB: &str = "/subscriptions/00000000-0000-0000-0000-000000000000";
const RG: &str = "/subscriptions/00000000-0000-0000-0000-000000000000/resourceGroups/rg";
const FAKE: &str =
    "/subscriptions/00000000-0000-0000-0000-000000000000/resourceGroups/rg/providers/Microsoft.FakeProvider/fakeResources/fake";

fn record(id: &str) -> NotificationResource {
    let arm = ArmResource::new(Activity::Delete, id, None).unwrap();
    NotificationResource::new(arm, ChangeAction::Delete)
}

fn subject_of(ids: &[&str]) -> String {
    let records: Vec<_> = ids.iter().map(|id| record(id)).collect();
    subject(&records)
}

#[test]
fn test_subject_shared_scopes() {
    let cases = [
        ("same subscription", SUB.to_string(), SUB.to_string(), SUB.to_string()),
        (
            "different subscription",
            SUB.to_string(),
            "/subscriptions/00000000-0000-0000-0000-000000000001".to_string(),
            "/".to_string(),
        ),
        ("same resource group", RG.to_string(), RG.to_string(), RG.to_string()),
        (
            "different resource group",
            RG.to_string(),
            format!("{SUB}/resourceGroups/rg1"),
            SUB.to_string(),
        ),
        ("same resource", FAKE.to_string(), FAKE.to_string(), FAKE.to_string()),
        ("different resource", FAKE.to_string(), format!("{FAKE}1"), RG.to_string()),
        (
            "different resource type",
            FAKE.to_string(),
            format!("{RG}/providers/Microsoft.FakeProvider/fakeResources1/fake"),
            RG.to_string(),
        ),
        (
            "different subresource",
            format!("{FAKE}/subresource/fakesub"),
            format!("{FAKE}/subresource/fakesub1"),
            FAKE.to_string(),
        ),
        (
            "same extension resource",
            format!("{FAKE}/providers/Microsoft.FakeProvider/fakeExtensionResources/fakeext"),
            format!("{FAKE}/providers/Microsoft.FakeProvider/fakeExtensionResources/fakeext"),
            format!("{FAKE}/providers/Microsoft.FakeProvider/fakeExtensionResources/fakeext"),
        ),
        (
            "different extension resource",
            format!("{FAKE}/providers/Microsoft.FakeProvider/fakeExtensionResources/fakeext"),
            format!("{FAKE}/providers/Microsoft.FakeProvider/fakeExtensionResources/fakeext1"),
            FAKE.to_string(),
        ),
        ("different length resources", FAKE.to_string(), SUB.to_string(), SUB.to_string()),
    ];

    for (name, a, b, want) in cases {
        assert_eq!(subject_of(&[a.as_str(), b.as_str()]), want, "case: {name}");
    }
}

#[test]
fn test_subject_single_resource_is_its_id() {
    assert_eq!(subject_of(&[FAKE]), FAKE);
}

#[test]
fn test_subject_empty() {
    assert_eq!(subject(&[]), "");
}

#[test]
fn test_subject_unparseable_id_falls_back_to_root() {
    let mut bad = record(FAKE);
    bad.arm_resource = ArmResource::default();
    bad.resource_id = "not-a-resource-id".into();
    assert_eq!(subject(&[record(FAKE), bad]), "/");
}

#[test]
fn test_resource_id_parse() {
    let id = ResourceId::parse(&format!("{FAKE}/extensions/ext")).unwrap();
    assert_eq!(id.name(), "ext");
    assert_eq!(id.resource_type(), "Microsoft.FakeProvider/fakeResources/extensions");
    assert_eq!(id.to_string(), format!("{FAKE}/extensions/ext"));

    assert_eq!(ResourceId::parse(RG).unwrap().resource_type(), "Microsoft.Resources/resourceGroups");
    assert_eq!(ResourceId::parse(SUB).unwrap().resource_type(), "Microsoft.Resources/subscriptions");
}

#[test]
fn test_resource_id_parse_rejects_malformed() {
    assert!(ResourceId::parse("subscriptions/x").is_none());
    assert!(ResourceId::parse("/subscriptions").is_none());
    assert!(ResourceId::parse("/subscriptions//resourceGroups/rg").is_none());
    assert!(ResourceId::parse(&format!("{RG}/providers/Microsoft.Fake/only")).is_none());
}
