pub struct Service {
    pub key: &'static str,
    pub label: &'static str,
    pub duration_minutes: i64,
}

pub const SERVICE_CATALOG: &[Service] = &[
    Service {
        key: "car_servicing",
        label: "Car servicing",
        duration_minutes: 120,
    },
    Service {
        key: "car_wash",
        label: "Car wash",
        duration_minutes: 60,
    },
    Service {
        key: "polish",
        label: "Polishing",
        duration_minutes: 240,
    },
];

pub fn find_service(key: &str) -> Option<&'static Service> {
    SERVICE_CATALOG.iter().find(|s| s.key == key)
}

pub fn catalog_summary() -> String {
    SERVICE_CATALOG
        .iter()
        .map(|s| s.label.to_lowercase())
        .collect::<Vec<_>>()
        .join(" / ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_known_service() {
        let svc = find_service("car_wash").unwrap();
        assert_eq!(svc.label, "Car wash");
        assert_eq!(svc.duration_minutes, 60);
    }

    #[test]
    fn test_find_unknown_service() {
        assert!(find_service("haircut").is_none());
    }

    #[test]
    fn test_catalog_summary_lists_all() {
        let summary = catalog_summary();
        assert_eq!(summary, "car servicing / car wash / polishing");
    }
}
