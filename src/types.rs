// src/types.rs

// 驱动状态机
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum DriverState {
    Unconfigured,
    Calibrating,
    Streaming,
    Stopped,
    Faulted,
}

// 正常结束的原因
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum StreamOutcome {
    // 运行标志在两帧之间被清除
    Stopped { frames: u64 },
    // 数据源没有更多帧
    EndOfStream { frames: u64 },
}

// 后台发给 GUI 的消息
#[derive(Clone, Debug)]
pub enum StreamMessage {
    Log(String),
    State(DriverState),
    Finished(Result<StreamOutcome, String>),
}
