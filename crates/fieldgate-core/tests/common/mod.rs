// Shared fixtures for fieldgate-core integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use chrono::{DateTime, TimeZone, Utc};

use fieldgate_core::{
    Company, DeviceKind, DeviceWrite, Engine, EngineConfig, EntityId, Program, SiteCadenceConfig,
    SiteWrite,
};

/// 2024-05-01 at `h:m` UTC.
pub fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, h, m, 0).unwrap()
}

/// Engine with two companies, one program each, sites `north` (acme /
/// orchard) and `south` (globex / vineyard), and cameras `CAM-1`,
/// `CAM-2` at `north`. The executor is not started.
pub fn engine() -> Engine {
    engine_with(EngineConfig::default())
}

pub fn engine_with(config: EngineConfig) -> Engine {
    let engine = Engine::new(config);
    for (company, program, site) in [("acme", "orchard", "north"), ("globex", "vineyard", "south")]
    {
        engine.add_company(Company {
            id: company.into(),
            name: company.to_uppercase(),
        });
        engine
            .add_program(Program {
                id: program.into(),
                company_id: company.into(),
                name: program.into(),
            })
            .unwrap();
        engine
            .add_site(SiteWrite {
                id: site.into(),
                program_id: program.into(),
                name: site.into(),
                cadence: None,
            })
            .unwrap();
    }
    for cam in ["cam-1", "cam-2"] {
        engine.write_device(camera(cam, "north")).unwrap();
    }
    engine
}

pub fn camera(id: &str, site: &str) -> DeviceWrite {
    DeviceWrite {
        id: id.into(),
        name: Some(format!("{id} camera")),
        kind: DeviceKind::ImageCapture,
        firmware_version: Some("1.4.2".into()),
        site_id: Some(EntityId::from(site)),
    }
}

pub fn set_cadence(engine: &Engine, site: &str, cadence: SiteCadenceConfig) {
    engine
        .set_site_cadence(&EntityId::from(site), Some(cadence))
        .unwrap();
}
