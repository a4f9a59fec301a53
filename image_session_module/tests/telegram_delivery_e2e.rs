use image_session_module::{Delivery, DeliveryError, TelegramDelivery};
use mockito::{Matcher, Server};
use std::fs;
use tempfile::TempDir;

#[test]
fn text_message_uses_send_message() -> Result<(), Box<dyn std::error::Error>> {
    let mut server = Server::new();
    let mock = server
        .mock("POST", "/bottest-token/sendMessage")
        .match_header("content-type", "application/json")
        .match_body(Matcher::Regex("\"chat_id\":\"4242\"".to_string()))
        .match_body(Matcher::Regex("Still working".to_string()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"ok":true,"result":{"message_id":7}}"#)
        .create();

    let delivery = TelegramDelivery::new("test-token", "4242").with_api_base(server.url());
    delivery.send("Still working on your image?", None)?;

    mock.assert();
    Ok(())
}

#[test]
fn image_is_sent_as_photo_with_caption() -> Result<(), Box<dyn std::error::Error>> {
    let temp = TempDir::new()?;
    let image = temp.path().join("current.png");
    fs::write(&image, "fake image bytes")?;

    let mut server = Server::new();
    let mock = server
        .mock("POST", "/bottest-token/sendPhoto")
        .match_header(
            "content-type",
            Matcher::Regex("multipart/form-data".to_string()),
        )
        .match_body(Matcher::Regex("Here is edit #1.".to_string()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"ok":true,"result":{"message_id":8}}"#)
        .create();

    let delivery = TelegramDelivery::new("test-token", "4242").with_api_base(server.url());
    delivery.send("Here is edit #1.", Some(&image))?;

    mock.assert();
    Ok(())
}

#[test]
fn api_rejection_is_reported() {
    let mut server = Server::new();
    let _mock = server
        .mock("POST", "/bottest-token/sendMessage")
        .with_status(400)
        .with_header("content-type", "application/json")
        .with_body(r#"{"ok":false,"description":"Bad Request: chat not found"}"#)
        .create();

    let delivery = TelegramDelivery::new("test-token", "4242").with_api_base(server.url());
    let err = delivery.send("hello", None).expect_err("rejected");

    match err {
        DeliveryError::Rejected(description) => {
            assert_eq!(description, "Bad Request: chat not found")
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
