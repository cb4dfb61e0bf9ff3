//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约快照测试
//! - 端到端流测试：ingestion -> processor -> output
//! - 确认语义 (at-least-once) 回归

#[cfg(test)]
mod contract_tests {
    use contracts::{Batch, DeliveryError, Transaction, BUILTIN_PROCESSORS};

    #[test]
    fn test_contracts_compile() {
        // 验证 contracts crate 可编译
        let _ = contracts::ConfigVersion::V1;
    }

    #[test]
    fn test_builtin_registry_matches_contract() {
        let registry = processor::ProcessorRegistry::with_builtins();
        for name in BUILTIN_PROCESSORS {
            assert!(registry.contains(name), "missing {name}");
        }
    }

    #[tokio::test]
    async fn test_delivery_error_fans_out_unchanged() {
        let (tx, rx) = Transaction::new(Batch::from_payloads(["a"]));
        let (_, ack) = tx.into_parts();
        contracts::AckHandle::merge(vec![ack]).ack(Err(DeliveryError::ShutdownInProgress));
        assert_eq!(rx.wait().await, Err(DeliveryError::ShutdownInProgress));
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use cache::CacheRegistry;
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{
        Batch, CacheConfig, CacheType, ProcessorConfig, RetryConfig, StreamConfig,
        SubprocessCacheConfig, WriteError, Writer,
    };
    use ingestion::{IngestionPipeline, IngestionReport, StaticSource};
    use output::OutputBuilder;
    use processor::{ProcessorPipeline, ProcessorRegistry};

    /// Shared view of what a `RecordingWriter` saw
    #[derive(Default)]
    struct Recorded {
        /// Batches that reached the downstream, payloads as strings
        batches: Mutex<Vec<Vec<String>>>,
        /// Outcomes for upcoming writes; empty means success
        script: Mutex<VecDeque<Result<(), WriteError>>>,
        /// Errors returned after the batch was already recorded
        lost_acks: Mutex<VecDeque<WriteError>>,
        active: AtomicUsize,
        peak: AtomicUsize,
        attempts: AtomicUsize,
    }

    impl Recorded {
        fn batches(&self) -> Vec<Vec<String>> {
            self.batches.lock().unwrap().clone()
        }

        fn payloads(&self) -> Vec<String> {
            self.batches().into_iter().flatten().collect()
        }
    }

    struct RecordingWriter {
        recorded: Arc<Recorded>,
        delay: Duration,
    }

    impl RecordingWriter {
        fn new() -> (Self, Arc<Recorded>) {
            Self::scripted(Vec::new())
        }

        fn scripted(script: Vec<Result<(), WriteError>>) -> (Self, Arc<Recorded>) {
            let recorded = Arc::new(Recorded {
                script: Mutex::new(script.into()),
                ..Default::default()
            });
            let writer = Self {
                recorded: Arc::clone(&recorded),
                delay: Duration::ZERO,
            };
            (writer, recorded)
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        /// The next writes land downstream but report `errors` anyway
        fn with_lost_acks(self, errors: Vec<WriteError>) -> Self {
            *self.recorded.lost_acks.lock().unwrap() = errors.into();
            self
        }
    }

    impl Writer for RecordingWriter {
        fn name(&self) -> &str {
            "recorder"
        }

        async fn connect(&self) -> Result<(), WriteError> {
            Ok(())
        }

        async fn write(&self, batch: &Batch) -> Result<(), WriteError> {
            let recorded = &self.recorded;
            recorded.attempts.fetch_add(1, Ordering::SeqCst);
            let active = recorded.active.fetch_add(1, Ordering::SeqCst) + 1;
            recorded.peak.fetch_max(active, Ordering::SeqCst);

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            let (landed, outcome) = match recorded.lost_acks.lock().unwrap().pop_front() {
                Some(error) => (true, Err(error)),
                None => {
                    let outcome = recorded.script.lock().unwrap().pop_front().unwrap_or(Ok(()));
                    (outcome.is_ok(), outcome)
                }
            };
            if landed {
                let payloads = batch
                    .iter()
                    .map(|p| String::from_utf8_lossy(p.payload()).into_owned())
                    .collect();
                recorded.batches.lock().unwrap().push(payloads);
            }

            recorded.active.fetch_sub(1, Ordering::SeqCst);
            outcome
        }

        async fn close(&self) -> Result<(), WriteError> {
            Ok(())
        }
    }

    /// Wire input -> processors -> output and drive the source to completion
    async fn run_stream(
        config: &StreamConfig,
        writer: RecordingWriter,
        source: StaticSource,
    ) -> (IngestionReport, output::MetricsSnapshot) {
        let caches = CacheRegistry::from_config(&config.resources).unwrap();
        let chain = ProcessorRegistry::with_builtins()
            .build_chain(&config.pipeline.processors, &caches)
            .unwrap();

        let mut output = OutputBuilder::from_config(&config.output).spawn(writer);
        let mut ingestion = IngestionPipeline::new(config.input.clone());
        let rx = ingestion.take_receiver().unwrap();
        let processors = ProcessorPipeline::spawn(
            chain,
            config.pipeline.threads,
            rx,
            output.sender().unwrap(),
        );

        let exhausted = ingestion.exhausted();
        let drain = output.drain_token();
        tokio::spawn(async move {
            exhausted.cancelled().await;
            drain.cancel();
        });

        let report = ingestion.run(source).await.unwrap();
        processors.join().await;

        output.close_async();
        output
            .wait_for_close(Duration::from_secs(5))
            .await
            .unwrap();
        let metrics = output.metrics().snapshot();
        (report, metrics)
    }

    fn ordered_config() -> StreamConfig {
        let mut config = StreamConfig::default();
        config.input.max_pending = 1;
        config.output.name = "recorder".into();
        config
    }

    /// try 子节点失败的消息由 catch 处理，其余原样通过
    #[tokio::test]
    async fn test_e2e_try_catch_routing() {
        let toml = r#"
[input]
max_pending = 1

[[pipeline.processors]]
type = "try"

[[pipeline.processors.processors]]
type = "parse_json"

[[pipeline.processors.processors]]
type = "text"
params = { operator = "append", value = "!" }

[[pipeline.processors]]
type = "catch"

[[pipeline.processors.processors]]
type = "text"
params = { operator = "prepend", value = "bad:" }

[output]
name = "recorder"
type = "log"
"#;
        let config = ConfigLoader::load_from_str(toml, ConfigFormat::Toml).unwrap();
        let (writer, recorded) = RecordingWriter::new();

        let (report, _) = run_stream(
            &config,
            writer,
            StaticSource::from_payloads([r#"{ "a": 1 }"#, "nope", r#"{"b":2}"#]),
        )
        .await;

        assert_eq!(
            recorded.payloads(),
            vec![r#"{"a":1}!"#, "bad:nope", r#"{"b":2}!"#]
        );
        assert_eq!(report.summary.acked, 3);
        assert_eq!(report.summary.nacked, 0);
    }

    /// 未被 catch 的失败消息被否定确认、重投，超出预算后放弃
    #[tokio::test]
    async fn test_e2e_uncaught_failure_nacks_and_abandons() {
        let mut config = ordered_config();
        config.input.max_redeliveries = 2;
        config.pipeline.processors = vec![ProcessorConfig::new("parse_json")];
        let (writer, recorded) = RecordingWriter::new();

        let (report, metrics) =
            run_stream(&config, writer, StaticSource::from_payloads(["nope"])).await;

        assert_eq!(recorded.attempts.load(Ordering::SeqCst), 0);
        assert_eq!(report.metrics.deliveries, 3);
        assert_eq!(report.metrics.abandoned, 1);
        assert_eq!(report.summary.nack_reasons.get("failed_parts"), Some(&3));
        assert_eq!(metrics.nack_count, 3);
    }

    /// drop_failed 过滤后为空的批次被确认
    #[tokio::test]
    async fn test_e2e_filtered_batch_is_acked() {
        let mut config = ordered_config();
        config.pipeline.processors = vec![
            ProcessorConfig::new("parse_json"),
            ProcessorConfig::new("drop_failed"),
        ];
        let (writer, recorded) = RecordingWriter::new();

        let (report, _) = run_stream(
            &config,
            writer,
            StaticSource::new([Batch::from_payloads(["nope", "{}"]), Batch::from_payloads(["x"])]),
        )
        .await;

        assert_eq!(recorded.batches(), vec![vec!["{}".to_string()]]);
        assert_eq!(report.summary.acked, 2);
    }

    /// count=3 批处理：7 个事务写成 3/3/1，最后不满的一批在输入耗尽后刷新
    #[tokio::test(start_paused = true)]
    async fn test_e2e_batch_count_with_period() {
        let mut config = StreamConfig::default();
        config.input.max_pending = 16;
        config.output.name = "recorder".into();
        config.output.batching.count = 3;
        config.output.batching.period_ms = 50;
        let (writer, recorded) = RecordingWriter::new();

        let payloads: Vec<String> = (0..7).map(|i| format!("m{i}")).collect();
        let (report, metrics) =
            run_stream(&config, writer, StaticSource::from_payloads(payloads.clone())).await;

        let sizes: Vec<usize> = recorded.batches().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![3, 3, 1]);

        let mut written = recorded.payloads();
        written.sort();
        assert_eq!(written, payloads);

        assert_eq!(report.summary.acked, 7);
        assert_eq!(metrics.batch_count, 3);
        assert_eq!(metrics.write_count, 3);
    }

    /// 仅按 count 批处理：输入耗尽后未满的批次也会被刷新，不会卡住
    #[tokio::test]
    async fn test_e2e_count_only_batching_drains() {
        let mut config = StreamConfig::default();
        config.input.max_pending = 16;
        config.output.name = "recorder".into();
        config.output.batching.count = 3;
        config_loader::validate(&config).unwrap();
        let (writer, recorded) = RecordingWriter::new();

        let payloads: Vec<String> = (0..7).map(|i| format!("m{i}")).collect();
        let (report, metrics) = tokio::time::timeout(
            Duration::from_secs(5),
            run_stream(&config, writer, StaticSource::from_payloads(payloads.clone())),
        )
        .await
        .expect("partial batch flushed after the source ends");

        assert!(recorded.batches().iter().all(|b| !b.is_empty() && b.len() <= 3));
        assert_eq!(recorded.payloads(), payloads);
        assert_eq!(report.summary.acked, 7);
        assert_eq!(metrics.write_count, metrics.batch_count);
    }

    /// 并发写入不超过 max_in_flight
    #[tokio::test(start_paused = true)]
    async fn test_e2e_concurrent_writes_bounded() {
        let mut config = StreamConfig::default();
        config.input.max_pending = 10;
        config.output.name = "recorder".into();
        config.output.max_in_flight = 3;
        let (writer, recorded) = RecordingWriter::new();
        let writer = writer.with_delay(Duration::from_millis(50));

        let payloads: Vec<String> = (0..10).map(|i| format!("m{i}")).collect();
        let (report, metrics) =
            run_stream(&config, writer, StaticSource::from_payloads(payloads)).await;

        assert_eq!(recorded.peak.load(Ordering::SeqCst), 3);
        assert_eq!(metrics.peak_in_flight, 3);
        assert_eq!(recorded.payloads().len(), 10);
        assert_eq!(report.summary.acked, 10);
    }

    /// 重试成功对上游透明
    #[tokio::test(start_paused = true)]
    async fn test_e2e_retry_recovers_without_redelivery() {
        let mut config = ordered_config();
        config.output.retry = RetryConfig {
            max_retries: 3,
            ..Default::default()
        };
        let (writer, recorded) = RecordingWriter::scripted(vec![
            Err(WriteError::retryable("busy")),
            Err(WriteError::connection_lost("reset")),
        ]);

        let (report, metrics) =
            run_stream(&config, writer, StaticSource::from_payloads(["a"])).await;

        assert_eq!(recorded.payloads(), vec!["a"]);
        assert_eq!(metrics.retry_count, 2);
        assert_eq!(report.metrics.redelivered, 0);
        assert_eq!(report.summary.acked, 1);
    }

    /// 重试耗尽后否定确认，输入端重投同一批次，且只确认一次
    #[tokio::test(start_paused = true)]
    async fn test_e2e_exhausted_retries_redeliver() {
        let mut config = ordered_config();
        config.output.retry = RetryConfig {
            max_retries: 1,
            ..Default::default()
        };
        let (writer, recorded) = RecordingWriter::scripted(vec![
            Err(WriteError::retryable("busy")),
            Err(WriteError::retryable("busy")),
            Err(WriteError::retryable("busy")),
        ]);

        let (report, metrics) =
            run_stream(&config, writer, StaticSource::from_payloads(["a"])).await;

        assert_eq!(recorded.payloads(), vec!["a"]);
        assert_eq!(recorded.attempts.load(Ordering::SeqCst), 4);
        assert_eq!(metrics.failure_count, 1);
        assert_eq!(report.metrics.redelivered, 1);
        assert_eq!(report.summary.acked, 1);
        assert_eq!(report.summary.nack_reasons.get("write_error"), Some(&1));
    }

    /// 重投保持顺序，且每条消息只被确认一次
    #[tokio::test]
    async fn test_e2e_redelivery_preserves_order() {
        let config = ordered_config();
        let (writer, recorded) = RecordingWriter::scripted(vec![
            Ok(()),
            Err(WriteError::fatal("rejected")),
        ]);

        let (report, _) = run_stream(
            &config,
            writer,
            StaticSource::new([
                Batch::from_payloads(["a1", "a2"]),
                Batch::from_payloads(["b1", "b2"]),
                Batch::from_payloads(["c1"]),
            ]),
        )
        .await;

        assert_eq!(
            recorded.batches(),
            vec![
                vec!["a1".to_string(), "a2".to_string()],
                vec!["b1".to_string(), "b2".to_string()],
                vec!["c1".to_string()],
            ]
        );
        assert_eq!(report.summary.acked, 3);
        assert_eq!(report.summary.nacked, 1);
        assert_eq!(report.metrics.redelivered, 1);
    }

    /// 已写入下游但确认丢失：重投产生重复写入，顺序不变，每次投递只确认一次
    #[tokio::test]
    async fn test_e2e_duplicate_delivery_after_lost_ack() {
        let config = ordered_config();
        let (writer, recorded) = RecordingWriter::new();
        let writer = writer.with_lost_acks(vec![WriteError::fatal("ack lost")]);

        let (report, metrics) = run_stream(
            &config,
            writer,
            StaticSource::new([
                Batch::from_payloads(["a1", "a2", "a3"]),
                Batch::from_payloads(["b1", "b2"]),
            ]),
        )
        .await;

        let a: Vec<String> = ["a1", "a2", "a3"].map(String::from).to_vec();
        let b: Vec<String> = ["b1", "b2"].map(String::from).to_vec();
        assert_eq!(recorded.batches(), vec![a.clone(), a, b]);

        assert_eq!(report.metrics.deliveries, 3);
        assert_eq!(report.metrics.redelivered, 1);
        assert_eq!(report.summary.acked, 2);
        assert_eq!(report.summary.nacked, 1);
        assert_eq!(
            report.summary.acked + report.summary.nacked,
            report.metrics.deliveries
        );
        assert_eq!(metrics.failure_count, 1);
    }

    /// 重试重写已落地的批次：下游看到重复，上游只看到一次成功确认
    #[tokio::test(start_paused = true)]
    async fn test_e2e_retry_after_lost_ack_duplicates_downstream_only() {
        let mut config = ordered_config();
        config.output.retry = RetryConfig {
            max_retries: 3,
            ..Default::default()
        };
        let (writer, recorded) = RecordingWriter::new();
        let writer = writer.with_lost_acks(vec![WriteError::retryable("timeout after send")]);

        let (report, metrics) =
            run_stream(&config, writer, StaticSource::from_payloads(["x"])).await;

        assert_eq!(recorded.payloads(), vec!["x", "x"]);
        assert_eq!(metrics.retry_count, 1);
        assert_eq!(report.metrics.deliveries, 1);
        assert_eq!(report.summary.acked, 1);
        assert_eq!(report.summary.nacked, 0);
    }

    /// 子进程缓存：命中替换 payload，未命中的消息进入 catch
    #[tokio::test]
    async fn test_e2e_subprocess_cache_lookup() {
        let mut config = ordered_config();
        config.resources.caches.insert(
            "lookup".into(),
            CacheConfig {
                cache_type: CacheType::Subprocess,
                memory: Default::default(),
                subprocess: SubprocessCacheConfig {
                    name: "sh".into(),
                    args: vec![
                        "-c".into(),
                        r#"[ "$2" = "k1" ] && printf v1"#.into(),
                        "--".into(),
                    ],
                },
            },
        );
        config.pipeline.processors = vec![
            ProcessorConfig::new("cache")
                .with_param("resource", "lookup")
                .with_param("operator", "get"),
            ProcessorConfig::new("catch").with_children(vec![ProcessorConfig::new("text")
                .with_param("operator", "prepend")
                .with_param("value", "miss:")]),
        ];
        config_loader::validate(&config).unwrap();
        let (writer, recorded) = RecordingWriter::new();

        let (report, _) =
            run_stream(&config, writer, StaticSource::from_payloads(["k1", "k2"])).await;

        assert_eq!(recorded.payloads(), vec!["v1", "miss:k2"]);
        assert_eq!(report.summary.acked, 2);
    }

    /// 内存缓存去重：重复的 key 在 add 时失败并被过滤
    #[tokio::test]
    async fn test_e2e_memory_cache_dedupe() {
        let mut config = ordered_config();
        config.resources.caches.insert(
            "seen".into(),
            CacheConfig {
                cache_type: CacheType::Memory,
                memory: Default::default(),
                subprocess: Default::default(),
            },
        );
        config.pipeline.processors = vec![
            ProcessorConfig::new("cache")
                .with_param("resource", "seen")
                .with_param("operator", "add"),
            ProcessorConfig::new("drop_failed"),
        ];
        let (writer, recorded) = RecordingWriter::new();

        let (report, _) = run_stream(
            &config,
            writer,
            StaticSource::from_payloads(["x", "y", "x", "z", "y"]),
        )
        .await;

        assert_eq!(recorded.payloads(), vec!["x", "y", "z"]);
        assert_eq!(report.summary.acked, 5);
    }
}
