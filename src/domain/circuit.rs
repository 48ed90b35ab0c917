use crate::domain::models::{CleanedRecord, RejectReason, ServiceType, SITE_STATUS_LIVE};

pub const CIRCLE_NAME_COL: usize = 1;
pub const LINK_TECH_COL: usize = 11;
pub const INTERFACE_COL: usize = 12;
pub const VLAN_COL: usize = 15;
pub const NSS_ID_COL: usize = 21;
pub const ROUTER_HOSTNAME_COL: usize = 23;
pub const ROUTER_IP_COL: usize = 25;

fn field<'a>(row: &'a [String], index: usize) -> &'a str {
    row.get(index).map(String::as_str).unwrap_or("")
}

pub fn service_type_code(row: &[String]) -> String {
    format!("{}_{}", field(row, LINK_TECH_COL), field(row, INTERFACE_COL))
}

/// `nss_id` minus its first two characters, followed by the service suffix.
pub fn derive_circuit_id(nss_id: &str, service_type_c: &str) -> Option<String> {
    let service = ServiceType::from_code(service_type_c)?;
    if nss_id.chars().count() < 2 {
        return None;
    }
    let tail: String = nss_id.chars().skip(2).collect();
    Some(format!("{}{}", tail, service.suffix()))
}

pub fn build_record(row: &[String]) -> CleanedRecord {
    let nss_id = field(row, NSS_ID_COL).to_string();
    let service_type_c = service_type_code(row);
    let circuit_id = derive_circuit_id(&nss_id, &service_type_c);

    CleanedRecord {
        circle_name: field(row, CIRCLE_NAME_COL).to_string(),
        circuit_id,
        nss_id,
        vlan: field(row, VLAN_COL).to_string(),
        service_type_c,
        optics_router_hostname: field(row, ROUTER_HOSTNAME_COL).to_string(),
        router_ip: field(row, ROUTER_IP_COL).to_string(),
        site_status: SITE_STATUS_LIVE.to_string(),
    }
}

/// First reason the record cannot be stored, if any.
pub fn check_validity(record: &CleanedRecord) -> Result<(), RejectReason> {
    match record.circuit_id.as_deref() {
        Some(id) if !id.is_empty() => {}
        _ if ServiceType::from_code(&record.service_type_c).is_none() => {
            return Err(RejectReason::UnknownServiceType(record.service_type_c.clone()));
        }
        _ if record.nss_id.chars().count() < 2 => {
            return Err(RejectReason::ShortNssId);
        }
        _ => return Err(RejectReason::MissingField("circuit_id")),
    }

    let required = [
        ("circle_name", &record.circle_name),
        ("nss_id", &record.nss_id),
        ("vlan", &record.vlan),
        ("service_type_c", &record.service_type_c),
        ("optics_router_hostname", &record.optics_router_hostname),
        ("router_ip", &record.router_ip),
        ("site_status", &record.site_status),
    ];
    match required.iter().find(|(_, value)| value.is_empty()) {
        Some((name, _)) => Err(RejectReason::MissingField(*name)),
        None => Ok(()),
    }
}
