use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use master_errors::{MasterError, MasterResult};

use crate::record::elapsed_millis;

/// 发往从节点的任务消息
///
/// 负载对主控端不透明；角色在派发时附加两个路由字段：
/// `history_uid`（首次派发时分配，重新派发时原样保留）与 `role_name`（缺失时补齐）。
/// 下游的转发注册表依靠这两个字段回传结果。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMessage {
    pub listener: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_uid: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_name: Option<String>,
}

impl TaskMessage {
    pub fn new(listener: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            listener: listener.into(),
            payload,
            history_uid: None,
            role_name: None,
        }
    }

    /// 附加历史 uid。已存在时保持原值，返回实际生效的 uid
    pub fn attach_history_uid(&mut self, uid: u64) -> u64 {
        *self.history_uid.get_or_insert(uid)
    }

    /// 附加角色名。已存在时保持原值（多跳转发场景）
    pub fn attach_role_name(&mut self, name: &str) {
        if self.role_name.is_none() {
            self.role_name = Some(name.to_string());
        }
    }

    pub fn from_json(raw: &str) -> MasterResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn to_json(&self) -> MasterResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// 从节点上报的历史记录（线上格式）
///
/// 存在 `piece_first` 字段即为分片报告，否则为角色报告。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMessage {
    pub uid: u64,
    #[serde(default)]
    pub listener: String,
    /// 毫秒时间戳
    pub start_time: i64,
    /// 毫秒时间戳
    pub end_time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub piece_first: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub piece_size: Option<u64>,
}

/// 解码后的报告
#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    Role(RoleReport),
    Piece(PieceReport),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoleReport {
    pub uid: u64,
    pub listener: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

/// 并行分片模式的报告，由分片派发器处理
#[derive(Debug, Clone, PartialEq)]
pub struct PieceReport {
    pub uid: u64,
    pub listener: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub piece_first: u64,
    pub piece_size: u64,
}

impl ReportMessage {
    pub fn from_json(raw: &str) -> MasterResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn to_json(&self) -> MasterResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn is_piece(&self) -> bool {
        self.piece_first.is_some()
    }

    pub fn into_report(self) -> MasterResult<Report> {
        let started_at = millis_to_datetime(self.start_time, "start_time")?;
        let ended_at = millis_to_datetime(self.end_time, "end_time")?;

        match self.piece_first {
            None => Ok(Report::Role(RoleReport {
                uid: self.uid,
                listener: self.listener,
                started_at,
                ended_at,
            })),
            Some(piece_first) => {
                let piece_size = self.piece_size.ok_or_else(|| {
                    MasterError::invalid_report(format!(
                        "分片报告 {} 缺少 piece_size 字段",
                        self.uid
                    ))
                })?;
                Ok(Report::Piece(PieceReport {
                    uid: self.uid,
                    listener: self.listener,
                    started_at,
                    ended_at,
                    piece_first,
                    piece_size,
                }))
            }
        }
    }
}

impl Report {
    pub fn uid(&self) -> u64 {
        match self {
            Report::Role(report) => report.uid,
            Report::Piece(report) => report.uid,
        }
    }
}

impl RoleReport {
    /// 从节点自报的耗时（毫秒），下限为 1
    pub fn reported_elapsed(&self) -> i64 {
        elapsed_millis(self.started_at, self.ended_at)
    }
}

fn millis_to_datetime(millis: i64, field: &str) -> MasterResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| MasterError::invalid_report(format!("{field} 超出范围: {millis}")))
}
