//! 统计信息
//!
//! RLC AM 实体的可观测计数器。

use serde::Serialize;

/// 每个实体的计数器：所有丢弃、重复与重传都记在这里
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RlcStats {
    // 发送侧
    pub tx_sdus_accepted: u64,
    pub tx_sdus_discarded: u64,
    pub tx_sdus_aqm_dropped: u64,
    pub tx_pdus: u64,
    pub tx_bytes: u64,
    pub retx_pdus: u64,
    pub retx_bytes: u64,
    pub status_pdus_sent: u64,
    pub polls_sent: u64,
    pub window_stalls: u64,
    pub tiny_opportunities: u64,
    pub max_retx_reached: u64,
    pub harq_failures: u64,

    // 接收侧
    pub rx_pdus: u64,
    pub rx_bytes: u64,
    pub rx_duplicates: u64,
    pub rx_out_of_window: u64,
    pub rx_malformed: u64,
    pub rx_pdus_lost: u64,
    pub rx_sdus_delivered: u64,
    pub rx_sdus_discarded: u64,
    pub status_pdus_received: u64,
}
