//! 会话运行时集成测试

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use snapcode::core::{spawn_session, SessionCommand, SessionSnapshot};
    use snapcode::history::VersionKind;
    use snapcode::request::{GenerationRequest, RequestBuilder};
    use snapcode::transport::{
        MockOutcome, MockScript, MockTransport, SessionTransport, TransportHandle,
    };
    use snapcode::{GenerationOrchestrator, Phase};
    use tokio::sync::watch;

    /// 按顺序为每次 open 回放不同脚本
    struct SequenceTransport {
        scripts: Mutex<Vec<MockScript>>,
        requests: Mutex<Vec<GenerationRequest>>,
    }

    impl SequenceTransport {
        fn new(scripts: Vec<MockScript>) -> Self {
            Self {
                scripts: Mutex::new(scripts.into_iter().rev().collect()),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    impl SessionTransport for SequenceTransport {
        fn open(&self, request: GenerationRequest) -> TransportHandle {
            self.requests.lock().unwrap().push(request.clone());
            let script = self
                .scripts
                .lock()
                .unwrap()
                .pop()
                .expect("no script left");
            MockTransport::scripted(script).open(request)
        }
    }

    fn hang() -> MockScript {
        MockScript {
            logs: vec!["Generating code...".into()],
            chunks: vec!["<div".into()],
            outcome: MockOutcome::Hang,
        }
    }

    async fn wait_for(
        state: &mut watch::Receiver<SessionSnapshot>,
        pred: impl Fn(&SessionSnapshot) -> bool,
    ) -> SessionSnapshot {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                {
                    let snap = state.borrow_and_update();
                    if pred(&snap) {
                        return snap.clone();
                    }
                }
                state.changed().await.expect("session task ended");
            }
        })
        .await
        .expect("timed out waiting for session state")
    }

    #[tokio::test]
    async fn test_create_scenario_with_mock_transport() {
        let transport = Arc::new(MockTransport::scripted(MockScript::streaming(&[
            "<div",
            ">hi</div>",
        ])));
        let mut orch = GenerationOrchestrator::new(transport.clone(), RequestBuilder::default());

        let stream = orch.create(vec!["data:image/png;base64,AAAA".into()]).unwrap();
        assert_eq!(orch.run_cycle(stream).await, Phase::Ready);

        assert_eq!(orch.history().len(), 1);
        assert_eq!(orch.current_version(), Some(0));
        assert_eq!(orch.live_buffer(), "");
        let node = orch.history().get(0).unwrap();
        assert_eq!(node.kind, VersionKind::InitialCreate);
        assert_eq!(node.code, "<div>hi</div>");
        assert_eq!(orch.console_log(), &["Generating code...".to_string()]);
    }

    #[tokio::test]
    async fn test_runtime_branching_session() {
        let transport = Arc::new(SequenceTransport::new(vec![
            MockScript::streaming(&["<p>", "v0", "</p>"]),
            MockScript::streaming(&["<p>v1</p>"]),
            MockScript::streaming(&["<p>v2</p>"]),
        ]));
        let orch = GenerationOrchestrator::new(transport.clone(), RequestBuilder::default());
        let mut channels = spawn_session(orch);

        channels
            .commands
            .send(SessionCommand::Create(vec!["img".into()]))
            .unwrap();
        let snap = wait_for(&mut channels.state, |s| {
            s.phase == Phase::Ready && s.history.len() == 1
        })
        .await;
        assert_eq!(snap.current_code.as_deref(), Some("<p>v0</p>"));

        // 片段按到达顺序广播
        let mut streamed = String::new();
        while let Ok(chunk) = channels.stream.try_recv() {
            streamed.push_str(&chunk);
        }
        assert_eq!(streamed, "<p>v0</p>");

        channels
            .commands
            .send(SessionCommand::Update {
                instruction: "make it blue".into(),
                include_snapshot: false,
            })
            .unwrap();
        wait_for(&mut channels.state, |s| s.current_version == Some(1)).await;

        channels.commands.send(SessionCommand::RevertTo(0)).unwrap();
        channels
            .commands
            .send(SessionCommand::Update {
                instruction: "fix spacing".into(),
                include_snapshot: false,
            })
            .unwrap();
        let snap = wait_for(&mut channels.state, |s| s.current_version == Some(2)).await;
        assert_eq!(snap.phase, Phase::Ready);

        let tree: Vec<(usize, usize)> = snap.history.iter().map(|l| (l.index, l.depth)).collect();
        assert_eq!(tree, vec![(0, 0), (1, 1), (2, 1)]);

        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests[2].history, vec!["fix spacing".to_string()]);
    }

    #[tokio::test]
    async fn test_runtime_stop_and_reset() {
        let transport = Arc::new(SequenceTransport::new(vec![
            hang(),
            MockScript::streaming(&["<p>v0</p>"]),
            hang(),
            hang(),
        ]));
        let orch = GenerationOrchestrator::new(transport, RequestBuilder::default());
        let mut channels = spawn_session(orch);

        // 第一次 create 被停止：回到 Idle，历史为空
        channels
            .commands
            .send(SessionCommand::Create(vec!["img".into()]))
            .unwrap();
        wait_for(&mut channels.state, |s| s.live_buffer == "<div").await;
        channels.commands.send(SessionCommand::Stop).unwrap();
        let snap = wait_for(&mut channels.state, |s| s.phase == Phase::Idle).await;
        assert!(snap.history.is_empty());
        assert_eq!(snap.current_version, None);

        channels
            .commands
            .send(SessionCommand::Create(vec!["img".into()]))
            .unwrap();
        wait_for(&mut channels.state, |s| s.phase == Phase::Ready).await;

        // Edit 周期被停止：回到 Ready，当前版本不变
        channels
            .commands
            .send(SessionCommand::Update {
                instruction: "make it blue".into(),
                include_snapshot: false,
            })
            .unwrap();
        wait_for(&mut channels.state, |s| s.live_buffer == "<div").await;
        channels.commands.send(SessionCommand::Stop).unwrap();
        let snap = wait_for(&mut channels.state, |s| s.phase == Phase::Ready).await;
        assert_eq!(snap.current_version, Some(0));
        assert_eq!(snap.history.len(), 1);
        assert_eq!(snap.live_buffer, "");

        // reset 抢占在途生成
        channels
            .commands
            .send(SessionCommand::Update {
                instruction: "again".into(),
                include_snapshot: false,
            })
            .unwrap();
        wait_for(&mut channels.state, |s| s.phase == Phase::Generating).await;
        channels.commands.send(SessionCommand::Reset).unwrap();
        let snap = wait_for(&mut channels.state, |s| s.phase == Phase::Idle).await;
        assert!(snap.history.is_empty());
        assert_eq!(snap.console_tail, None);
    }
}
