//! Built-in service catalog served when the provider cannot be reached.

use billpay_types::{Amount, ServiceListing, Variation};

fn service(id: &str, name: &str, description: &str) -> ServiceListing {
    ServiceListing {
        id: id.to_string(),
        name: name.to_string(),
        description: Some(description.to_string()),
        variations: Vec::new(),
    }
}

fn bundle(code: &str, name: &str, minor: i64) -> Variation {
    Variation {
        variation_code: code.to_string(),
        name: name.to_string(),
        amount: Amount::from_minor(minor).ok(),
    }
}

/// Static services for a service type. Unknown types get an empty list.
pub fn builtin_services(service_type: &str) -> Vec<ServiceListing> {
    match service_type.to_ascii_lowercase().as_str() {
        "airtime" => vec![
            service("mtn", "MTN", "MTN Airtime"),
            service("airtel", "Airtel", "Airtel Airtime"),
            service("glo", "Glo", "Glo Airtime"),
            service("9mobile", "9mobile", "9mobile Airtime"),
        ],
        "data" => vec![
            ServiceListing {
                variations: vec![
                    bundle("mtn-1gb", "1GB", 100_000),
                    bundle("mtn-2gb", "2GB", 200_000),
                ],
                ..service("mtn-data", "MTN Data", "MTN Data Bundle")
            },
            ServiceListing {
                variations: vec![
                    bundle("airtel-1gb", "1GB", 100_000),
                    bundle("airtel-2gb", "2GB", 200_000),
                ],
                ..service("airtel-data", "Airtel Data", "Airtel Data Bundle")
            },
        ],
        "electricity" | "electricity-bill" => vec![
            service("ikeja-electric", "Ikeja Electric", "Ikeja Electric Postpaid"),
            service("eko-electric", "Eko Electric", "Eko Electric Prepaid"),
        ],
        "exam" | "education" => vec![
            service("jamb", "JAMB", "JAMB UTME/DE Registration PIN"),
            service("waec", "WAEC", "WAEC Result Checker PIN"),
        ],
        _ => Vec::new(),
    }
}
