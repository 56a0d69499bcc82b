//! Both protocols over a real socket on one port.

use iotctl::app::service::HELP_TEXT;
use iotctl::pins;

use crate::harness::LiveServer;

#[test]
fn http_help_matches_line_help() {
    let server = LiveServer::start();
    let line = server.line_session(&["HELP"]).join("\n");
    let reply = server.post_command("HELP");
    assert_eq!(reply.command, "HELP");
    assert_eq!(reply.response, line);
    assert_eq!(reply.response, HELP_TEXT);
    assert!(reply.timestamp > 1_600_000_000);
}

#[test]
fn unknown_command_on_both_protocols() {
    let server = LiveServer::start();
    assert_eq!(
        server.line_session(&["FOO_BAR"]),
        vec!["ERROR: unknown command 'FOO_BAR'".to_string()]
    );
    let reply = server.post_command("FOO_BAR");
    assert_eq!(reply.response, "ERROR: unknown command 'FOO_BAR'");
}

#[test]
fn invalid_brightness_keeps_level_and_session() {
    let server = LiveServer::start();
    let replies = server.line_session(&["LED_BRIGHTNESS 1", "LED_BRIGHTNESS 5", "", "LED_ON"]);
    assert_eq!(replies.len(), 3);
    assert_eq!(replies[0], "OK: LED brightness set to 1");
    assert!(replies[1].starts_with("ERROR: "), "{}", replies[1]);
    assert_eq!(replies[2], "OK: LED on");
    assert_eq!(server.rig.hal.pwm(pins::LED_PWM_GPIO), Some(1024));
}

#[test]
fn quit_stops_accept_loop() {
    let server = LiveServer::start();
    let replies = server.line_session(&["LED_ON", "QUIT"]);
    assert_eq!(replies, vec!["OK: LED on", "OK: server shutting down"]);
    assert!(server.rig.shutdown.is_triggered());
    server.join().expect("accept loop returns cleanly");
}

#[test]
fn http_endpoints() {
    let server = LiveServer::start();

    let (status, body) = server.http("OPTIONS /api/command HTTP/1.1\r\nHost: t\r\n\r\n");
    assert_eq!(status, "HTTP/1.1 200 OK");
    assert!(body.is_empty());

    let (status, body) = server.http("GET / HTTP/1.1\r\nHost: t\r\n\r\n");
    assert_eq!(status, "HTTP/1.1 200 OK");
    assert!(body.contains("<html>") || body.contains("<!DOCTYPE html>"));

    let (status, _) = server.http("GET /nope HTTP/1.1\r\nHost: t\r\n\r\n");
    assert_eq!(status, "HTTP/1.1 404 Not Found");

    let body = "{\"command\": 42}";
    let (status, reply) = server.http(&format!(
        "POST /api/command HTTP/1.1\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    ));
    assert_eq!(status, "HTTP/1.1 200 OK");
    assert!(reply.contains("\"command\": \"UNKNOWN\""), "{}", reply);
}

#[test]
fn http_drives_devices() {
    let server = LiveServer::start();
    assert_eq!(server.post_command("SEGMENT_DISPLAY 8").response, "OK: SEGMENT showing 8");
    assert_eq!(
        server.rig.hal.levels(&pins::SEGMENT_GPIOS),
        vec![Some(true), Some(false), Some(false), Some(false)]
    );
    server.rig.hal.set_light(200);
    assert_eq!(server.post_command("CDS_READ").response, "OK: light value 200 (dark)");
}

#[test]
fn sessions_are_served_in_turn() {
    let server = LiveServer::start();
    for i in 0..5 {
        let replies = server.line_session(&[&format!("SEGMENT_DISPLAY {}", i)]);
        assert_eq!(replies, vec![format!("OK: SEGMENT showing {}", i)]);
    }
    server.rig.shutdown.trigger();
    server.join().expect("clean stop");
}
