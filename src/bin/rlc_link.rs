//! RLC AM 链路仿真
//!
//! ue -> enb 批量 SDU 传输，数据方向可注入丢包与 HARQ 失败；结束时打印双方计数器。

use clap::Parser;
use rlcam_rs::demo::{LinkOpts, build_radio_link, schedule_bulk_transfer};
use rlcam_rs::net::NetWorld;
use rlcam_rs::rlc::{RlcAmConfig, RlcStats};
use rlcam_rs::sim::{SimTime, Simulator};
use serde::Serialize;
use std::error::Error;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "rlc-link", about = "RLC AM over a lossy simulated radio link")]
struct Args {
    /// RlcAmConfig 的 JSON 文件（缺省字段取默认值）
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, default_value_t = 300)]
    sdu_bytes: usize,
    #[arg(long, default_value_t = 200)]
    sdus: u64,
    /// 两个 SDU 提交间隔（微秒）
    #[arg(long, default_value_t = 1000)]
    gap_us: u64,
    #[arg(long, default_value_t = 600)]
    opportunity_bytes: usize,
    #[arg(long, default_value_t = 200)]
    reverse_opportunity_bytes: usize,
    /// TTI（微秒）
    #[arg(long, default_value_t = 1000)]
    tti_us: u64,
    /// 单向传播时延（微秒）
    #[arg(long, default_value_t = 2000)]
    latency_us: u64,
    /// 每第 N 个数据 PDU 丢失（0 = 不丢）
    #[arg(long, default_value_t = 0)]
    drop_every: u64,
    /// 每第 N 个数据 PDU 触发 HARQ 失败（0 = 不触发）
    #[arg(long, default_value_t = 0)]
    harq_fail_every: u64,
    /// 覆盖 t-Reordering（毫秒）
    #[arg(long)]
    reordering_ms: Option<u64>,
    /// 覆盖 max_retx_threshold
    #[arg(long)]
    max_retx: Option<u32>,
    /// 覆盖 max_tx_buffer_size（字节）
    #[arg(long)]
    max_tx_buffer: Option<usize>,
    #[arg(long)]
    enable_aqm: bool,
    /// 仿真运行到多少毫秒
    #[arg(long, default_value_t = 2000)]
    until_ms: u64,
    /// 把计数器以 JSON 写入该文件
    #[arg(long)]
    stats_json: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct Report<'a> {
    now_ms: f64,
    sdus_submitted: u64,
    sdus_delivered: usize,
    delivered_in_order: bool,
    sender: &'a RlcStats,
    receiver: &'a RlcStats,
    link: &'a rlcam_rs::net::LinkStats,
}

fn load_config(args: &Args) -> Result<RlcAmConfig, Box<dyn Error>> {
    let mut config = match &args.config {
        Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
        None => RlcAmConfig::default(),
    };
    if let Some(ms) = args.reordering_ms {
        config.reordering_timer = SimTime::from_millis(ms);
    }
    if let Some(n) = args.max_retx {
        config.max_retx_threshold = n;
    }
    if let Some(bytes) = args.max_tx_buffer {
        config.max_tx_buffer_size = bytes;
    }
    config.enable_aqm |= args.enable_aqm;
    config.validate()?;
    Ok(config)
}

fn main() -> Result<(), Box<dyn Error>> {
    // 初始化 tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    let opts = LinkOpts {
        sdu_bytes: args.sdu_bytes,
        sdus: args.sdus,
        gap: SimTime::from_micros(args.gap_us),
        opportunity_bytes: args.opportunity_bytes,
        reverse_opportunity_bytes: args.reverse_opportunity_bytes,
        tti: SimTime::from_micros(args.tti_us),
        latency: SimTime::from_micros(args.latency_us),
        drop_every: args.drop_every,
        harq_fail_every: args.harq_fail_every,
        until: SimTime::from_millis(args.until_ms),
    };

    let mut sim = Simulator::default();
    let mut world = NetWorld::default();
    let (ue, enb) = build_radio_link(&mut world, &opts, &config)?;
    schedule_bulk_transfer(&mut sim, &opts, ue, enb);
    sim.run_until(opts.until, &mut world);

    let (Some(tx), Some(rx)) = (world.link.endpoint(ue), world.link.endpoint(enb)) else {
        return Err("endpoints missing after run".into());
    };
    let sns = rx.log().delivered_pdcp_sns();
    let delivered_in_order = sns.windows(2).all(|w| (w[0] + 1) & 0x0FFF == w[1]);

    let report = Report {
        now_ms: sim.now().as_millis_f64(),
        sdus_submitted: opts.sdus,
        sdus_delivered: sns.len(),
        delivered_in_order,
        sender: tx.rlc.stats(),
        receiver: rx.rlc.stats(),
        link: &world.link.stats,
    };

    println!(
        "done @ {:.3} ms, sdus_submitted={}, sdus_delivered={}, in_order={}",
        report.now_ms, report.sdus_submitted, report.sdus_delivered, report.delivered_in_order
    );
    println!(
        "sender: tx_pdus={}, retx_pdus={}, polls={}, status_received={}, max_retx_reached={}",
        report.sender.tx_pdus,
        report.sender.retx_pdus,
        report.sender.polls_sent,
        report.sender.status_pdus_received,
        report.sender.max_retx_reached
    );
    println!(
        "receiver: rx_pdus={}, duplicates={}, lost={}, sdus_discarded={}, status_sent={}",
        report.receiver.rx_pdus,
        report.receiver.rx_duplicates,
        report.receiver.rx_pdus_lost,
        report.receiver.rx_sdus_discarded,
        report.receiver.status_pdus_sent
    );

    if let Some(path) = &args.stats_json {
        fs::write(path, serde_json::to_string_pretty(&report)?)?;
    }
    Ok(())
}
