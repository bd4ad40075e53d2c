use chanbridge_core::{CallError, ChannelConfig, Method, StringMap, Value};
use chanbridge_plugin::{
    error_codes, ChannelServer, Dispatcher, PluginRequest, PluginResponse, PluginResult,
};
use std::io::Cursor;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct FakePlayer {
    path: Option<String>,
    playing: bool,
    volume: f32,
    position_ms: i64,
}

fn audio_dispatcher(player: Arc<Mutex<FakePlayer>>) -> Dispatcher {
    let load = Arc::clone(&player);
    let play = Arc::clone(&player);
    let volume = Arc::clone(&player);
    let seek = Arc::clone(&player);
    let position = Arc::clone(&player);

    Dispatcher::new("flutter_audio_desktop")
        .with_handler("load", move |method: &mut Method| {
            let path: String = method.get_argument("path")?;
            load.lock().unwrap().path = Some(path);
            method.return_null()
        })
        .with_handler("play", move |method: &mut Method| {
            let mut player = play.lock().unwrap();
            if player.path.is_none() {
                return Err(CallError::Handler {
                    method: method.name().to_string(),
                    message: "nothing loaded".into(),
                });
            }
            player.playing = true;
            method.return_null()
        })
        .with_handler("setVolume", move |method: &mut Method| {
            let level: f32 = method.get_argument("volume")?;
            volume.lock().unwrap().volume = level;
            method.return_null()
        })
        .with_handler("setPosition", move |method: &mut Method| {
            let ms: i32 = method.get_argument("position")?;
            seek.lock().unwrap().position_ms = i64::from(ms);
            method.return_null()
        })
        .with_handler("getPosition", move |method: &mut Method| {
            let ms = position.lock().unwrap().position_ms;
            method.return_value(ms)
        })
        .with_handler("getDevices", |method: &mut Method| {
            let mut devices = StringMap::new();
            devices.insert("default".into(), "Default Output".into());
            devices.insert("hw:1".into(), "USB DAC".into());
            method.return_value(devices)
        })
}

fn request_lines(requests: &[PluginRequest]) -> String {
    requests
        .iter()
        .map(|req| serde_json::to_string(req).unwrap() + "\n")
        .collect()
}

fn serve(dispatcher: Dispatcher, input: String) -> Vec<PluginResponse> {
    let server = ChannelServer::new(dispatcher, &ChannelConfig::default());
    let mut output = Vec::new();
    server
        .serve(Cursor::new(input), &mut output)
        .expect("serve loop should reach EOF");
    String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[test]
fn audio_session_round_trip() {
    use chanbridge_core::Invocation;

    let player = Arc::new(Mutex::new(FakePlayer::default()));
    let requests = [
        PluginRequest::new(1, &Invocation::new("load").with_argument("path", "/music/a.flac")),
        PluginRequest::new(2, &Invocation::new("setVolume").with_argument("volume", 0.5)),
        PluginRequest::new(3, &Invocation::new("setPosition").with_argument("position", 1500)),
        PluginRequest::new(4, &Invocation::new("play")),
        PluginRequest::new(5, &Invocation::new("getPosition")),
        PluginRequest::new(6, &Invocation::new("getDevices")),
        PluginRequest::new(7, &Invocation::new("eject")),
    ];

    let responses = serve(audio_dispatcher(Arc::clone(&player)), request_lines(&requests));
    assert_eq!(responses.len(), requests.len());
    for (request, response) in requests.iter().zip(&responses) {
        assert_eq!(request.id, response.id);
    }

    for response in &responses[..4] {
        assert_eq!(response.result, PluginResult::Success { value: Value::Null });
    }
    assert_eq!(responses[4].result, PluginResult::Success { value: Value::Int(1500) });
    match &responses[5].result {
        PluginResult::Success { value } => {
            let devices = value.get::<StringMap>().unwrap();
            assert_eq!(devices.len(), 2);
            assert_eq!(devices["hw:1"], "USB DAC");
        }
        other => panic!("expected device map, got {other:?}"),
    }
    assert_eq!(responses[6].result, PluginResult::NotImplemented);

    let player = player.lock().unwrap();
    assert_eq!(player.path.as_deref(), Some("/music/a.flac"));
    assert_eq!(player.volume, 0.5);
    assert!(player.playing);
}

#[test]
fn bad_invocations_do_not_touch_the_player() {
    let player = Arc::new(Mutex::new(FakePlayer::default()));
    let input = concat!(
        "{\"id\":1,\"method\":\"load\"}\n",
        "{\"id\":2,\"method\":\"setVolume\",\"args\":{\"volume\":\"loud\"}}\n",
        "{\"id\":3,\"method\":\"setPosition\",\"args\":{\"position\":9999999999}}\n",
        "{\"id\":4,\"method\":\"play\"}\n",
    );

    let responses = serve(audio_dispatcher(Arc::clone(&player)), input.to_string());
    assert_eq!(responses.len(), 4);

    let codes: Vec<_> = responses
        .iter()
        .map(|response| match &response.result {
            PluginResult::Error(err) => err.code.as_str(),
            other => panic!("expected error, got {other:?}"),
        })
        .collect();
    assert_eq!(
        codes,
        [
            error_codes::BAD_INVOCATION,
            error_codes::BAD_INVOCATION,
            error_codes::BAD_INVOCATION,
            error_codes::HANDLER_ERROR,
        ]
    );

    let player = player.lock().unwrap();
    assert!(player.path.is_none());
    assert!(!player.playing);
    assert_eq!(player.position_ms, 0);
}
