use hearth::{Document, Identity, Member};
use serde::{Deserialize, Serialize};

#[derive(Document, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[document(collection = "groups")]
#[serde(rename_all = "camelCase")]
struct Group {
    #[document(id)]
    group_id: String,
    name: String,
}

#[derive(Member, Serialize, Deserialize, Debug, Clone, PartialEq)]
struct Track {
    #[member(key)]
    #[serde(rename = "trackURI")]
    uri: String,
    title: String,
}

#[test]
fn document_derive_reports_collection_and_id() {
    let group = Group {
        group_id: "g1".into(),
        name: "Climbers".into(),
    };
    assert_eq!(Group::COLLECTION, "groups");
    assert_eq!(Group::ID_FIELD, "groupId");
    assert_eq!(group.id(), "g1");
    assert_eq!(group.doc_ref().path(), "groups/g1");
}

#[test]
fn member_key_follows_serde_rename() {
    let track = Track {
        uri: "spotify:track:1".into(),
        title: "Song".into(),
    };
    assert_eq!(Track::KEY_FIELD, "trackURI");
    assert_eq!(track.member_key(), "spotify:track:1");

    let encoded = serde_json::to_value(&track).unwrap();
    assert_eq!(Identity::of::<Track>().key_of(&encoded), Some("spotify:track:1"));
}
