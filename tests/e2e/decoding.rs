use brain_api::client::{Interaction, Payload, ROW_DELIMITER};
use brain_api::codec::{compress, Codec, NdArray};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::common::setup;

#[tokio::test]
async fn test_row_delimited_msgpack_stream() {
    let (server, config) = setup().await;
    config.update("compression", "msgpack").unwrap();

    let row1 = json!({"plateifu": "8485-1901", "z": 0.0407});
    let row2 = json!({"plateifu": "7443-12701", "z": 0.0200});
    let mut body = compress(&row1, Codec::Msgpack).unwrap();
    body.extend_from_slice(ROW_DELIMITER);
    body.extend(compress(&row2, Codec::Msgpack).unwrap());

    Mock::given(method("POST"))
        .and(path("/marvin/api/query/stream/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/octet-stream"))
        .mount(&server)
        .await;

    let result = Interaction::builder(&config, "query/stream/")
        .datastream(true)
        .chunk_size(4)
        .build()
        .unwrap()
        .send()
        .await
        .unwrap();

    assert_eq!(
        result.results,
        Payload::Json(json!({"data": [row1, row2]}))
    );
}

#[tokio::test]
async fn test_streamed_json_body() {
    let (server, config) = setup().await;
    let data: Vec<_> = (0..500).map(|i| json!({"row": i})).collect();
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"status": 1, "data": data})),
        )
        .mount(&server)
        .await;

    let result = Interaction::builder(&config, "query/")
        .stream(true)
        .chunk_size(64)
        .build()
        .unwrap()
        .send()
        .await
        .unwrap();

    assert_eq!(result.data().and_then(|d| d.as_array()).map(Vec::len), Some(500));
}

#[tokio::test]
async fn test_octet_stream_with_numeric_array() {
    let (server, config) = setup().await;

    let flux = NdArray::from_f64(vec![2, 2], &[1.0, 2.5, f64::NAN, -4.0]).unwrap();
    let envelope = rmpv::Value::Map(vec![
        (rmpv::Value::from("status"), rmpv::Value::from(1)),
        (rmpv::Value::from("data"), flux.to_msgpack()),
    ]);
    let mut body = Vec::new();
    rmpv::encode::write_value(&mut body, &envelope).unwrap();

    Mock::given(method("POST"))
        .and(path("/marvin/api/cubes/flux/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/octet-stream"))
        .mount(&server)
        .await;

    let result = Interaction::builder(&config, "cubes/flux/")
        .build()
        .unwrap()
        .send()
        .await
        .unwrap();

    assert_eq!(result.data(), Some(&json!([[1.0, 2.5], [null, -4.0]])));
}

#[tokio::test]
async fn test_other_content_types_are_returned_raw() {
    let (server, config) = setup().await;
    let fits = b"SIMPLE  =                    T".to_vec();
    Mock::given(method("GET"))
        .and(path("/marvin/api/cubes/file/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(fits.clone(), "application/fits"))
        .mount(&server)
        .await;

    let result = Interaction::builder(&config, "cubes/file/")
        .method("get")
        .build()
        .unwrap()
        .send()
        .await
        .unwrap();

    assert_eq!(result.results.as_bytes().map(|b| b.to_vec()), Some(fits));
    assert!(result.data().is_none());
}
