
use sim_rdma::{DeviceConfig, QpState, TransitionPolicy};
use test_utilities::*;

#[test]
fn pd_lifecycle() {
    let (device, _env) = isolated_device(DeviceConfig::new());
    let h1 = device.create_pd();
    assert!(h1 >= 1);
    assert!(device.get_pd_info(h1).is_some());
    device.destroy_pd(h1);
    assert!(device.get_pd_info(h1).is_none());
    // destroying an unknown handle is a silent no-op
    device.destroy_pd(999);
}

#[test]
fn cq_depth_guard() {
    let (device, _env) = isolated_device(DeviceConfig::new());
    let c = device.create_cq(16);
    assert!(c >= 1);
    assert_eq!(device.create_cq(0), 0);
}

#[test]
fn qp_creation_guards() {
    let (device, _env) = isolated_device(DeviceConfig::new());
    let cq = device.create_cq(16);
    assert_eq!(device.create_qp(0, 8, cq, cq), 0);
    assert_eq!(device.create_qp(8, 8, cq, 999), 0);
    assert_eq!(device.create_qp(8, 8, 999, cq), 0);
    let qp = device.create_qp(8, 8, cq, cq);
    assert!(qp >= 1);
}

#[test]
fn qp_state_walk() {
    let (device, _env) = isolated_device(DeviceConfig::new());
    let cq = device.create_cq(16);
    let q = device.create_qp(8, 8, cq, cq);
    assert!(device.modify_qp_state(q, QpState::Init));
    assert!(device.modify_qp_state(q, QpState::Rtr));
    assert!(device.modify_qp_state(q, QpState::Rts));
    // under the canonical policy RTS cannot fall back to INIT
    assert!(!device.modify_qp_state(q, QpState::Init));
    let info = device.get_qp_info(q).unwrap();
    assert_eq!(info.state(), QpState::Rts);
}

#[test]
fn permissive_policy_is_opt_in() {
    let (device, _env) = isolated_device(DeviceConfig::new());
    assert_eq!(device.transition_policy(), TransitionPolicy::Canonical);
    device.set_transition_policy(TransitionPolicy::Permissive);
    let cq = device.create_cq(16);
    let q = device.create_qp(8, 8, cq, cq);
    assert!(device.modify_qp_state(q, QpState::Rts));
    assert!(device.modify_qp_state(q, QpState::Init));
}

#[test]
fn mr_registration_guards_and_lifecycle() {
    let (device, _env) = isolated_device(DeviceConfig::new());
    assert_eq!(device.register_mr(std::ptr::null_mut(), 64, 0), 0);
    let mut buf = [0_u8; 64];
    let lkey = device.register_mr(buf.as_mut_ptr(), 64, 0x7);
    assert!(lkey >= 1);
    let info = device.get_mr_info(lkey).unwrap();
    assert_eq!(info.addr(), buf.as_mut_ptr());
    assert_eq!(info.length(), 64);
    assert_eq!(info.access_flags(), 0x7);
    device.deregister_mr(lkey);
    assert!(device.get_mr_info(lkey).is_none());
    device.deregister_mr(lkey);
}

#[test]
fn info_succeeds_until_destroy() {
    let (device, _env) = isolated_device(DeviceConfig::new());
    let cq = device.create_cq(16);
    let qp = device.create_qp(8, 8, cq, cq);
    assert!(device.get_cq_info(cq).is_some());
    assert!(device.get_qp_info(qp).is_some());
    device.destroy_qp(qp);
    assert!(device.get_qp_info(qp).is_none());
    device.destroy_cq(cq);
    assert!(device.get_cq_info(cq).is_none());
}

#[test]
fn handles_are_unique_and_monotonic() {
    let (device, _env) = isolated_device(DeviceConfig::new());
    let mut seen = std::collections::HashSet::new();
    for _ in 0..32 {
        let cq = device.create_cq(4);
        assert!(cq >= 1);
        assert!(seen.insert(cq), "handle {cq} was reused");
    }
}

#[test]
fn pd_bookkeeping_is_on_demand() {
    let (device, _env) = isolated_device(DeviceConfig::new());
    let pd = device.create_pd();
    let cq = device.create_cq(16);
    let qp = device.create_qp(8, 8, cq, cq);
    // the device does not group resources automatically
    assert!(device.get_pd_info(pd).unwrap().resources().is_empty());
    assert!(device.add_pd_resource(pd, "qp", qp));
    assert_eq!(
        device.get_pd_info(pd).unwrap().resources().get("qp"),
        Some(&vec![qp])
    );
    assert!(device.remove_pd_resource(pd, "qp", qp));
    assert!(!device.remove_pd_resource(pd, "qp", qp));
    assert!(!device.add_pd_resource(999, "qp", qp));
}

#[test]
fn req_notify_cq_checks_existence() {
    let (device, _env) = isolated_device(DeviceConfig::new());
    let cq = device.create_cq(16);
    assert!(device.req_notify_cq(cq, false));
    assert!(device.req_notify_cq(cq, true));
    assert!(!device.req_notify_cq(999, false));
}

#[test]
fn spill_does_not_change_observable_info() {
    let (device, _env) = isolated_device(
        DeviceConfig::new()
            .set_max_qps(1)
            .set_max_cqs(1)
            .set_max_mrs(1)
            .set_max_pds(1),
    );
    let cq = device.create_cq(16);
    let mut qps = Vec::new();
    for _ in 0..4 {
        let qp = device.create_qp(8, 8, cq, cq);
        assert!(qp >= 1);
        qps.push(qp);
    }
    // every record reads back identically no matter which tier holds it
    for qp in qps {
        let info = device.get_qp_info(qp).unwrap();
        assert_eq!(info.qp_num(), qp);
        assert_eq!(info.state(), QpState::Reset);
        assert_eq!(info.send_cq(), cq);
        assert_eq!(info.recv_cq(), cq);
    }
}
