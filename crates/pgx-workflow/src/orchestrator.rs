//! 流水线编排
//!
//! 提交后同时运行两件事：真实的上传分析请求，以及推进模拟阶段的本地计时器。
//! 两者竞争时响应总是优先；计时器只会把阶段推到 6，之后保持不动，
//! 直到响应到达后一次性跳到 7。取消时计时器停止，请求不会被中止，
//! 但其结果被丢弃，不会再产生任何状态变化。

use std::sync::Arc;
use std::time::Duration;

use pgx_core::{AnalysisBackend, AnalysisOutcome, PgxError, Result};
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::session::UploadSession;
use crate::state_machine::{PipelineEvent, PipelineStage, PipelineState, PipelineStateMachine};

/// 编排计时参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// 模拟阶段推进间隔
    pub tick_interval: Duration,
    /// 完成后停留在阶段 7 的时间
    pub completion_hold: Duration,
}

impl PipelineConfig {
    pub fn from_millis(tick_interval_ms: u64, completion_hold_ms: u64) -> Self {
        Self {
            tick_interval: Duration::from_millis(tick_interval_ms),
            completion_hold: Duration::from_millis(completion_hold_ms),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_millis(1500, 800)
    }
}

/// 流水线编排器
pub struct PipelineOrchestrator<B: AnalysisBackend + 'static> {
    backend: Arc<B>,
    config: PipelineConfig,
    machine: PipelineStateMachine,
    state: PipelineState,
    updates: Option<mpsc::UnboundedSender<PipelineState>>,
}

impl<B: AnalysisBackend + 'static> PipelineOrchestrator<B> {
    pub fn new(backend: Arc<B>, config: PipelineConfig) -> Self {
        Self {
            backend,
            config,
            machine: PipelineStateMachine::new(),
            state: PipelineState::idle(),
            updates: None,
        }
    }

    /// 订阅状态变化，每次转换推送一次快照；重复订阅会替换旧的接收端
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<PipelineState> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.updates = Some(tx);
        rx
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn apply(&mut self, event: PipelineEvent) -> Result<()> {
        self.state = self.machine.apply(self.state, event)?;
        tracing::debug!(
            "Pipeline {:?} -> stage {} ({})",
            event,
            self.state.stage.index(),
            self.state.stage.label()
        );
        if let Some(tx) = &self.updates {
            // 接收端已关闭时忽略
            let _ = tx.send(self.state);
        }
        Ok(())
    }

    /// 提交会话并等待分析结果
    ///
    /// 校验失败时不发出任何请求，也不改变状态。请求失败时阶段回到 0，
    /// 会话保持原样以便重试。成功时在阶段 7 停留 `completion_hold` 后返回结果，
    /// 返回的元数据带上本次上传的文件名。
    ///
    /// 上一次提交的 future 中途被丢弃时，状态停在处理阶段，下一次提交先将其取消。
    pub async fn submit(
        &mut self,
        session: &UploadSession,
        cancel: &CancellationToken,
    ) -> Result<AnalysisOutcome> {
        let request = session.to_request()?;
        if self.config.tick_interval.is_zero() {
            return Err(PgxError::Config("tick interval must be greater than zero".to_string()));
        }

        if self.state.stage.is_processing() {
            tracing::warn!(
                "Discarding abandoned submission at stage {}",
                self.state.stage.index()
            );
            self.apply(PipelineEvent::Cancel)?;
        } else if self.state.stage == PipelineStage::Complete {
            self.apply(PipelineEvent::Reset)?;
        }

        let file_name = request.file.file_name().to_string();
        tracing::info!(
            "Submitting {} ({} bytes) for patient {} with {} drug(s), {} co-medication(s)",
            file_name,
            request.file.len(),
            request.patient_code,
            request.drugs.len(),
            request.concurrent_medications.len()
        );

        self.apply(PipelineEvent::Submit)?;

        let backend = Arc::clone(&self.backend);
        let mut response = tokio::spawn(async move { backend.analyze(request).await });

        let tick = self.config.tick_interval;
        let mut ticker = interval_at(Instant::now() + tick, tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let joined = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    // 丢弃 JoinHandle 不会中止请求，结果直接被忽略
                    tracing::info!("Pipeline cancelled at stage {}", self.state.stage.index());
                    self.apply(PipelineEvent::Cancel)?;
                    return Err(PgxError::Cancelled);
                }
                joined = &mut response => break joined,
                _ = ticker.tick() => {
                    if self.machine.can_transition(&self.state.stage, &PipelineEvent::Tick) {
                        self.apply(PipelineEvent::Tick)?;
                    }
                }
            }
        };
        drop(ticker);

        let result = joined
            .map_err(|e| PgxError::Internal(format!("analysis task failed: {e}")))
            .and_then(|result| result);

        let mut outcome = match result {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!("Analysis failed: {}", err);
                self.apply(PipelineEvent::ResponseFailed)?;
                return Err(err);
            }
        };
        outcome.metadata.file_name = Some(file_name);

        self.apply(PipelineEvent::ResponseSucceeded)?;
        tracing::info!(
            "Analysis complete for {}: {} result(s)",
            outcome.metadata.patient_code,
            outcome.results.len()
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.apply(PipelineEvent::Reset)?;
                return Err(PgxError::Cancelled);
            }
            _ = tokio::time::sleep(self.config.completion_hold) => {}
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::Terminal;
    use async_trait::async_trait;
    use pgx_core::{AnalyzeRequest, UploadMetadata, VcfFile};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    const TICK: Duration = Duration::from_millis(1500);

    struct MockBackend {
        delay: Duration,
        failure: Option<String>,
        calls: AtomicUsize,
        completed: AtomicBool,
    }

    impl MockBackend {
        fn responding_after(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                delay,
                failure: None,
                calls: AtomicUsize::new(0),
                completed: AtomicBool::new(false),
            })
        }

        fn failing_after(delay: Duration, message: &str) -> Arc<Self> {
            Arc::new(Self {
                delay,
                failure: Some(message.to_string()),
                calls: AtomicUsize::new(0),
                completed: AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl AnalysisBackend for MockBackend {
        async fn analyze(&self, request: AnalyzeRequest) -> Result<AnalysisOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.completed.store(true, Ordering::SeqCst);
            match &self.failure {
                Some(message) => Err(PgxError::Api(message.clone())),
                None => Ok(AnalysisOutcome {
                    metadata: UploadMetadata {
                        patient_code: request.patient_code,
                        ..UploadMetadata::default()
                    },
                    results: Vec::new(),
                    gene_panel: None,
                }),
            }
        }
    }

    fn ready_session() -> UploadSession {
        let mut session = UploadSession::default();
        session.set_patient_code("PT-7");
        session.attach_file(VcfFile::new("sample.vcf", b"##fileformat=VCFv4.2\n".to_vec(), 1024).unwrap());
        session.select_drug("WARFARIN");
        session
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<PipelineState>) -> Vec<PipelineState> {
        let mut states = Vec::new();
        while let Ok(state) = rx.try_recv() {
            states.push(state);
        }
        states
    }

    fn stages(states: &[PipelineState]) -> Vec<u8> {
        states.iter().map(|s| s.stage.index()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_response_freezes_at_stage_six() {
        let backend = MockBackend::responding_after(TICK * 10 + TICK / 2);
        let mut orchestrator = PipelineOrchestrator::new(backend.clone(), PipelineConfig::default());
        let mut rx = orchestrator.subscribe();

        let started = Instant::now();
        let outcome = orchestrator
            .submit(&ready_session(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(started.elapsed() >= TICK * 10 + TICK / 2 + Duration::from_millis(800));
        assert_eq!(outcome.metadata.patient_code, "PT-7");
        assert_eq!(outcome.metadata.file_name.as_deref(), Some("sample.vcf"));

        let states = drain(&mut rx);
        assert_eq!(stages(&states), vec![1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(states.last().unwrap().terminal, Terminal::Success);

        // 完成后不再有计时器推进
        tokio::time::sleep(TICK * 5).await;
        assert!(drain(&mut rx).is_empty());
        assert_eq!(orchestrator.state().stage, PipelineStage::Complete);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_response_jumps_to_complete() {
        let backend = MockBackend::responding_after(TICK * 2 + TICK / 2);
        let mut orchestrator = PipelineOrchestrator::new(backend, PipelineConfig::default());
        let mut rx = orchestrator.subscribe();

        orchestrator
            .submit(&ready_session(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(stages(&drain(&mut rx)), vec![1, 2, 3, 7]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_resets_and_keeps_session() {
        let backend = MockBackend::failing_after(TICK + TICK / 2, "VCF parsing failed");
        let mut orchestrator = PipelineOrchestrator::new(backend.clone(), PipelineConfig::default());
        let mut rx = orchestrator.subscribe();
        let session = ready_session();

        let err = orchestrator
            .submit(&session, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "VCF parsing failed");
        assert_eq!(
            orchestrator.state(),
            PipelineState { stage: PipelineStage::Idle, terminal: Terminal::Failure }
        );
        assert_eq!(stages(&drain(&mut rx)), vec![1, 2, 0]);
        assert!(session.file().is_some());
        assert!(session.selected_drugs().contains("WARFARIN"));

        // 失败后可以直接重试
        let retry = orchestrator.submit(&session, &CancellationToken::new()).await;
        assert!(retry.is_err());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocked_submission_sends_nothing() {
        let backend = MockBackend::responding_after(TICK);
        let mut orchestrator = PipelineOrchestrator::new(backend.clone(), PipelineConfig::default());
        let mut rx = orchestrator.subscribe();

        let mut session = ready_session();
        session.clear_file();

        let err = orchestrator
            .submit(&session, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PgxError::Validation(_)));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        assert_eq!(orchestrator.state(), PipelineState::idle());
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_discards_late_response() {
        let backend = MockBackend::responding_after(TICK * 10);
        let mut orchestrator = PipelineOrchestrator::new(backend.clone(), PipelineConfig::default());
        let mut rx = orchestrator.subscribe();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(TICK * 3 + TICK / 2).await;
            trigger.cancel();
        });

        let err = orchestrator.submit(&ready_session(), &cancel).await.unwrap_err();
        assert!(matches!(err, PgxError::Cancelled));
        assert_eq!(stages(&drain(&mut rx)), vec![1, 2, 3, 4, 0]);

        // 请求继续完成，但不会再触发任何状态变化
        tokio::time::sleep(TICK * 20).await;
        assert!(backend.completed.load(Ordering::SeqCst));
        assert!(drain(&mut rx).is_empty());
        assert_eq!(orchestrator.state(), PipelineState::idle());
    }

    #[tokio::test(start_paused = true)]
    async fn test_resubmit_after_success() {
        let backend = MockBackend::responding_after(TICK / 2);
        let mut orchestrator = PipelineOrchestrator::new(backend.clone(), PipelineConfig::default());
        let mut rx = orchestrator.subscribe();
        let session = ready_session();

        orchestrator.submit(&session, &CancellationToken::new()).await.unwrap();
        orchestrator.submit(&session, &CancellationToken::new()).await.unwrap();

        assert_eq!(stages(&drain(&mut rx)), vec![1, 7, 0, 1, 7]);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_submission_does_not_block_resubmit() {
        let backend = MockBackend::responding_after(TICK * 2 + TICK / 2);
        let mut orchestrator = PipelineOrchestrator::new(backend.clone(), PipelineConfig::default());
        let mut rx = orchestrator.subscribe();
        let session = ready_session();

        let abandoned = tokio::time::timeout(
            TICK * 2 + Duration::from_millis(100),
            orchestrator.submit(&session, &CancellationToken::new()),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(orchestrator.state().stage, PipelineStage::CallingGenotypes);

        let outcome = orchestrator
            .submit(&session, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.metadata.patient_code, "PT-7");
        assert_eq!(stages(&drain(&mut rx)), vec![1, 2, 3, 0, 1, 2, 3, 7]);
        assert_eq!(orchestrator.state().terminal, Terminal::Success);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }
}
