use brain_api::client::resolve;
use brain_api::codec::{compress, uncompress, Codec};
use serde_json::json;

#[test]
fn test_uncompress_inverts_compress_for_every_codec() {
    let data = json!({"a": 1, "b": 2, "c": 3});
    for codec in Codec::ALL {
        let packed = compress(&data, codec).unwrap();
        assert_eq!(uncompress(&packed, codec).unwrap(), data, "codec {codec}");
    }
}

#[test]
fn test_nested_payload_survives_msgpack() {
    let data = json!({
        "plateifu": "8485-1901",
        "z": 0.0407447,
        "flags": [true, false],
        "nested": {"bins": [1, 2, 3], "missing": null}
    });
    let packed = compress(&data, Codec::Msgpack).unwrap();
    assert_eq!(uncompress(&packed, Codec::Msgpack).unwrap(), data);
}

#[test]
fn test_resolve_with_and_without_leading_slash() {
    assert_eq!(
        resolve("https://host/base/", "/route/"),
        "https://host/base/route/"
    );
    assert_eq!(
        resolve("https://host/base/", "route/"),
        "https://host/base/route/"
    );
    assert_eq!(
        resolve("https://host/base/", "https://host/base/route/"),
        "https://host/base/route/"
    );
}
