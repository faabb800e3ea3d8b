//! 流水线状态机
//!
//! 管理上传分析流程的阶段转换。阶段 1 到 6 是仅用于展示的模拟进度，
//! 不对应服务端的真实进度。

use pgx_core::{PgxError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 流水线阶段
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PipelineStage {
    Idle,                   // 0 空闲
    Uploading,              // 1 上传VCF
    ParsingVariants,        // 2 解析变异
    CallingGenotypes,       // 3 基因型判定
    CheckingInteractions,   // 4 合并用药检查
    MatchingGuidelines,     // 5 匹配CPIC指南
    GeneratingExplanations, // 6 生成解释
    Complete,               // 7 完成
}

impl PipelineStage {
    const ALL: [PipelineStage; 8] = [
        PipelineStage::Idle,
        PipelineStage::Uploading,
        PipelineStage::ParsingVariants,
        PipelineStage::CallingGenotypes,
        PipelineStage::CheckingInteractions,
        PipelineStage::MatchingGuidelines,
        PipelineStage::GeneratingExplanations,
        PipelineStage::Complete,
    ];

    pub fn index(&self) -> u8 {
        *self as u8
    }

    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    pub fn label(&self) -> &'static str {
        match self {
            PipelineStage::Idle => "Waiting for submission",
            PipelineStage::Uploading => "Uploading VCF file",
            PipelineStage::ParsingVariants => "Parsing variants",
            PipelineStage::CallingGenotypes => "Calling diplotypes",
            PipelineStage::CheckingInteractions => "Checking co-medications",
            PipelineStage::MatchingGuidelines => "Matching CPIC guidelines",
            PipelineStage::GeneratingExplanations => "Generating explanations",
            PipelineStage::Complete => "Analysis complete",
        }
    }

    /// 处于模拟进度阶段（1 到 6）
    pub fn is_processing(&self) -> bool {
        (1..=6).contains(&self.index())
    }
}

/// 流程终态标记
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Terminal {
    #[default]
    None,
    Success,
    Failure,
}

/// 流水线状态，只由编排器持有
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PipelineState {
    pub stage: PipelineStage,
    pub terminal: Terminal,
}

impl PipelineState {
    pub fn idle() -> Self {
        Self {
            stage: PipelineStage::Idle,
            terminal: Terminal::None,
        }
    }
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::idle()
    }
}

/// 状态转换事件
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PipelineEvent {
    Submit,
    Tick,
    ResponseSucceeded,
    ResponseFailed,
    Cancel,
    Reset,
}

/// 流水线状态机
#[derive(Debug)]
pub struct PipelineStateMachine {
    transitions: HashMap<(PipelineStage, PipelineEvent), PipelineStage>,
}

impl PipelineStateMachine {
    /// 创建新的状态机实例
    pub fn new() -> Self {
        let mut transitions = HashMap::new();

        transitions.insert((PipelineStage::Idle, PipelineEvent::Submit), PipelineStage::Uploading);

        // 计时器推进 1 -> 6，阶段 6 没有 Tick 转换，即进度封顶
        for index in 1..6u8 {
            if let (Some(from), Some(to)) = (PipelineStage::from_index(index), PipelineStage::from_index(index + 1)) {
                transitions.insert((from, PipelineEvent::Tick), to);
            }
        }

        for stage in PipelineStage::ALL.iter().filter(|s| s.is_processing()) {
            transitions.insert((*stage, PipelineEvent::ResponseSucceeded), PipelineStage::Complete);
            transitions.insert((*stage, PipelineEvent::ResponseFailed), PipelineStage::Idle);
            transitions.insert((*stage, PipelineEvent::Cancel), PipelineStage::Idle);
        }

        transitions.insert((PipelineStage::Complete, PipelineEvent::Reset), PipelineStage::Idle);

        Self { transitions }
    }

    /// 检查状态转换是否有效
    pub fn can_transition(&self, from: &PipelineStage, event: &PipelineEvent) -> bool {
        self.transitions.contains_key(&(*from, *event))
    }

    /// 执行阶段转换
    pub fn transition(&self, from: &PipelineStage, event: &PipelineEvent) -> Result<PipelineStage> {
        match self.transitions.get(&(*from, *event)) {
            Some(to) => Ok(*to),
            None => Err(PgxError::InvalidStateTransition {
                from: format!("{:?}", from),
                event: format!("{:?}", event),
            }),
        }
    }

    /// 执行转换并更新终态标记
    pub fn apply(&self, state: PipelineState, event: PipelineEvent) -> Result<PipelineState> {
        let stage = self.transition(&state.stage, &event)?;
        let terminal = match event {
            PipelineEvent::ResponseSucceeded => Terminal::Success,
            PipelineEvent::ResponseFailed => Terminal::Failure,
            PipelineEvent::Tick => state.terminal,
            PipelineEvent::Submit | PipelineEvent::Cancel | PipelineEvent::Reset => Terminal::None,
        };
        Ok(PipelineState { stage, terminal })
    }

    /// 获取阶段的所有可能事件
    pub fn get_possible_events(&self, current: &PipelineStage) -> Vec<PipelineEvent> {
        self.transitions
            .keys()
            .filter(|(stage, _)| stage == current)
            .map(|(_, event)| *event)
            .collect()
    }
}

impl Default for PipelineStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
