//! End-to-end exercise of device open, QP state machine, MR registration,
//! and the operation translator, all against the in-memory fabric fake.
//!
//! Requires the `fabric_fake` feature (`cargo test --features fabric_fake`).

#![cfg(feature = "fabric_fake")]

use std::sync::Arc;

use anyhow::Result;
use kfi_verbs_shim::{
    post_send, Access, Cq, DeviceRegistry, FakeFabric, Mr, Opcode, Pd, Qp, QpCaps, QpInitAttr,
    QpState, Sge, WorkRequest,
};

fn open_device() -> Result<kfi_verbs_shim::Device> {
    let _ = env_logger::builder().is_test(true).try_init();

    let registry = DeviceRegistry::new();
    let fabric = Arc::new(FakeFabric::new());
    registry.discover(fabric, "fake-cxi")?;
    registry
        .get(0)
        .ok_or_else(|| anyhow::anyhow!("fake provider produced no devices"))
}

#[test]
fn device_discovery_opens_the_fake_provider() -> Result<()> {
    let device = open_device()?;
    assert_eq!(device.name(), "fake-cxi");
    Ok(())
}

#[test]
fn qp_walks_its_full_state_machine() -> Result<()> {
    let device = open_device()?;
    let pd = Pd::new(&device);

    let send_cq = Cq::new(&device, Cq::DEFAULT_CQ_DEPTH)?;
    let recv_cq = Cq::new(&device, Cq::DEFAULT_CQ_DEPTH)?;
    let qp = Qp::new(
        &pd,
        QpInitAttr {
            send_cq,
            recv_cq,
            caps: QpCaps::default(),
        },
    )?;
    assert_eq!(qp.state(), QpState::Reset);

    qp.modify(QpState::Init, None, Some(7))?;
    assert_eq!(qp.state(), QpState::Init);

    qp.modify(QpState::Rtr, Some(&[0u8; 8]), None)?;
    assert_eq!(qp.state(), QpState::Rtr);

    qp.modify(QpState::Rts, None, None)?;
    assert_eq!(qp.state(), QpState::Rts);

    // ERR is reachable from any state; the core provides no transition out
    // of it. Recovery means the upper transport creates a fresh QP.
    qp.modify(QpState::Err, None, None)?;
    assert_eq!(qp.state(), QpState::Err);
    assert!(qp.modify(QpState::Rts, None, None).is_err());
    assert!(qp.modify(QpState::Reset, None, None).is_err());
    assert_eq!(qp.state(), QpState::Err);

    Ok(())
}

#[test]
fn qp_init_to_rtr_without_auth_is_rejected() -> Result<()> {
    let device = open_device()?;
    let pd = Pd::new(&device);
    let send_cq = Cq::new(&device, Cq::DEFAULT_CQ_DEPTH)?;
    let recv_cq = Cq::new(&device, Cq::DEFAULT_CQ_DEPTH)?;
    let qp = Qp::new(
        &pd,
        QpInitAttr {
            send_cq,
            recv_cq,
            caps: QpCaps::default(),
        },
    )?;

    // The fake provider has no default VNI, so RESET -> INIT fails without
    // an explicit override.
    assert!(qp.modify(QpState::Init, None, None).is_err());
    Ok(())
}

#[test]
fn send_chain_resolves_sges_through_the_mr_manager() -> Result<()> {
    let device = open_device()?;
    let pd = Pd::new(&device);

    let send_cq = Cq::new(&device, Cq::DEFAULT_CQ_DEPTH)?;
    let recv_cq = Cq::new(&device, Cq::DEFAULT_CQ_DEPTH)?;
    let qp = Qp::new(
        &pd,
        QpInitAttr {
            send_cq,
            recv_cq,
            caps: QpCaps::default(),
        },
    )?;
    qp.modify(QpState::Init, None, Some(7))?;
    qp.modify(QpState::Rtr, Some(&[0u8; 8]), None)?;
    qp.modify(QpState::Rts, None, None)?;

    let mr = Mr::get(&pd, 0x1000, 4096, Access::default())?;
    let sgl = [Sge {
        mr: &mr,
        offset: 0,
        len: 64,
    }];
    let chain = [WorkRequest {
        wr_id: 42,
        opcode: Opcode::Send { imm: None },
        sgl: &sgl,
    }];

    post_send(&qp, &chain).map_err(|f| anyhow::anyhow!("{:?}", f.error))?;
    Mr::put(&mr);
    Ok(())
}

#[test]
fn invalidate_degrades_to_send_with_one_warning() -> Result<()> {
    let device = open_device()?;
    let pd = Pd::new(&device);

    let send_cq = Cq::new(&device, Cq::DEFAULT_CQ_DEPTH)?;
    let recv_cq = Cq::new(&device, Cq::DEFAULT_CQ_DEPTH)?;
    let qp = Qp::new(
        &pd,
        QpInitAttr {
            send_cq,
            recv_cq,
            caps: QpCaps::default(),
        },
    )?;
    qp.modify(QpState::Init, None, Some(7))?;
    qp.modify(QpState::Rtr, Some(&[0u8; 8]), None)?;
    qp.modify(QpState::Rts, None, None)?;

    let mr = Mr::get(&pd, 0x2000, 4096, Access::default())?;
    let sgl = [Sge {
        mr: &mr,
        offset: 0,
        len: 16,
    }];
    let chain = [WorkRequest {
        wr_id: 1,
        opcode: Opcode::SendWithInvalidate,
        sgl: &sgl,
    }];

    // Degrades silently (to SEND) rather than failing; the diagnostic is a
    // log event, not an error return.
    post_send(&qp, &chain).map_err(|f| anyhow::anyhow!("{:?}", f.error))?;
    Mr::put(&mr);
    Ok(())
}
