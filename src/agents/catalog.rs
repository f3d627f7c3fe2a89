//! 内置演示数据：订单、产品、故障知识库与售后政策
//!
//! 只读静态数据，专家之间共享，无需加锁。

use chrono::{NaiveDate, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Processing,
    Shipped,
    Delivered,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
        }
    }

    /// 物流当前位置（演示用）
    pub fn location(&self) -> &'static str {
        match self {
            OrderStatus::Processing => "Fulfillment Center",
            OrderStatus::Shipped => "In Transit - Regional Hub",
            OrderStatus::Delivered => "Delivered to Address",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Order {
    pub id: &'static str,
    pub customer: &'static str,
    pub product_id: &'static str,
    pub price: f64,
    pub order_date: &'static str,
    pub delivery_date: &'static str,
    pub status: OrderStatus,
    pub warranty_years: u32,
    pub warranty_expires: &'static str,
}

#[derive(Debug, Clone)]
pub struct ProductSpecs {
    pub ram: &'static str,
    pub storage: &'static str,
    pub processor: &'static str,
    pub graphics: &'static str,
    pub display: &'static str,
    pub battery: &'static str,
    pub weight: &'static str,
}

#[derive(Debug, Clone)]
pub struct Product {
    pub id: &'static str,
    pub name: &'static str,
    pub specs: ProductSpecs,
    pub price: f64,
    pub inventory: u32,
    pub rating: f32,
    pub category: &'static str,
    pub warranty_years: u32,
}

impl Product {
    pub fn availability(&self) -> &'static str {
        match self.inventory {
            50.. => "In Stock",
            10..=49 => "Limited Stock",
            1..=9 => "Low Stock",
            0 => "Out of Stock",
        }
    }

    pub fn price_tier(&self) -> &'static str {
        if self.price < 700.0 {
            "Budget"
        } else if self.price < 1200.0 {
            "Mid-Range"
        } else if self.price < 1800.0 {
            "Premium"
        } else {
            "High-End"
        }
    }

    pub fn restock_estimate(&self) -> &'static str {
        match self.inventory {
            10.. => "No restock needed",
            1..=9 => "1-2 weeks",
            0 => "2-4 weeks",
        }
    }
}

pub const ORDERS: &[Order] = &[
    Order {
        id: "12345",
        customer: "Sarah Miller",
        product_id: "TB-PRO-15",
        price: 1299.99,
        order_date: "2024-01-28",
        delivery_date: "2024-01-30",
        status: OrderStatus::Delivered,
        warranty_years: 2,
        warranty_expires: "2026-01-30",
    },
    Order {
        id: "12346",
        customer: "John Davis",
        product_id: "TB-AIR-13",
        price: 899.99,
        order_date: "2024-02-15",
        delivery_date: "2024-02-18",
        status: OrderStatus::Delivered,
        warranty_years: 1,
        warranty_expires: "2025-02-18",
    },
    Order {
        id: "12347",
        customer: "Emily Wilson",
        product_id: "TB-GAME-17",
        price: 1899.99,
        order_date: "2024-03-01",
        delivery_date: "2024-03-05",
        status: OrderStatus::Shipped,
        warranty_years: 3,
        warranty_expires: "2027-03-05",
    },
];

pub const PRODUCTS: &[Product] = &[
    Product {
        id: "TB-PRO-15",
        name: "TechBook Pro 15",
        specs: ProductSpecs {
            ram: "16GB DDR4",
            storage: "512GB SSD",
            processor: "Intel i7-12700H",
            graphics: "Intel Iris Xe",
            display: "15.6\" 1920x1080 IPS",
            battery: "8 hours",
            weight: "3.5 lbs",
        },
        price: 1299.99,
        inventory: 45,
        rating: 4.5,
        category: "professional",
        warranty_years: 2,
    },
    Product {
        id: "TB-AIR-13",
        name: "TechBook Air 13",
        specs: ProductSpecs {
            ram: "8GB DDR4",
            storage: "256GB SSD",
            processor: "Intel i5-1235U",
            graphics: "Intel Iris Xe",
            display: "13.3\" 1920x1080 IPS",
            battery: "12 hours",
            weight: "2.8 lbs",
        },
        price: 899.99,
        inventory: 122,
        rating: 4.3,
        category: "ultrabook",
        warranty_years: 1,
    },
    Product {
        id: "TB-GAME-17",
        name: "TechBook Gaming 17",
        specs: ProductSpecs {
            ram: "32GB DDR4",
            storage: "1TB SSD",
            processor: "Intel i9-12900H",
            graphics: "NVIDIA RTX 4060",
            display: "17.3\" 2560x1440 165Hz",
            battery: "4 hours",
            weight: "5.2 lbs",
        },
        price: 1899.99,
        inventory: 23,
        rating: 4.7,
        category: "gaming",
        warranty_years: 3,
    },
    Product {
        id: "TB-BASIC-14",
        name: "TechBook Basic 14",
        specs: ProductSpecs {
            ram: "8GB DDR4",
            storage: "256GB SSD",
            processor: "Intel i3-1215U",
            graphics: "Intel UHD",
            display: "14\" 1366x768 TN",
            battery: "10 hours",
            weight: "3.1 lbs",
        },
        price: 599.99,
        inventory: 87,
        rating: 3.9,
        category: "budget",
        warranty_years: 1,
    },
];

/// 故障知识库：issue key -> 排查步骤
pub const KNOWLEDGE_BASE: &[(&str, &[&str])] = &[
    (
        "laptop_wont_turn_on",
        &[
            "Check if the power adapter is properly connected to both the laptop and wall outlet",
            "Try holding the power button for 10-15 seconds to perform a hard reset",
            "Remove the battery (if removable) and reinsert it firmly",
            "Check for LED indicators on the power adapter and laptop",
            "Try a different power outlet",
            "If still not working, the power adapter or internal components may need service",
        ],
    ),
    (
        "laptop_overheating",
        &[
            "Ensure all air vents are clear of dust and debris",
            "Use compressed air to clean vents and fan areas",
            "Check that the laptop is on a hard, flat surface for proper airflow",
            "Close unnecessary programs to reduce CPU load",
            "Consider using a laptop cooling pad",
            "Check Task Manager for high CPU usage applications",
        ],
    ),
    (
        "slow_performance",
        &[
            "Restart the laptop to clear temporary files and processes",
            "Check available storage space - ensure at least 15% free space",
            "Run disk cleanup to remove temporary files",
            "Check for malware using Windows Defender or antivirus software",
            "Update device drivers and operating system",
            "Consider upgrading RAM if usage consistently exceeds 80%",
        ],
    ),
    (
        "wifi_issues",
        &[
            "Restart your router and modem",
            "Forget and reconnect to the WiFi network",
            "Update WiFi adapter drivers",
            "Run Windows Network Troubleshooter",
            "Check if other devices can connect to the same network",
            "Reset network settings if other steps don't work",
        ],
    ),
    (
        "screen_issues",
        &[
            "Check display brightness settings",
            "Try connecting an external monitor to isolate the issue",
            "Update display drivers",
            "Check cable connections if using external monitor",
            "Restart in safe mode to test display functionality",
            "If built-in display has physical damage, professional repair needed",
        ],
    ),
];

/// 知识库未命中时的通用建议
pub const GENERAL_STEPS: &[&str] = &[
    "Restart the device and try again",
    "Check all cable connections",
    "Update device drivers and software",
    "Contact technical support if issue persists",
];

pub const ESCALATION_SIGNS: &[&str] = &[
    "Issue persists after following all troubleshooting steps",
    "Device shows signs of physical damage",
    "Customer reports unusual sounds, smells, or excessive heat",
];

pub struct ReturnPolicy {
    pub period_days: i64,
    pub restocking_fee: f64,
    pub free_return_reasons: &'static [&'static str],
    pub process: &'static [&'static str],
}

pub const RETURN_POLICY: ReturnPolicy = ReturnPolicy {
    period_days: 30,
    restocking_fee: 0.15,
    free_return_reasons: &["defective", "wrong_item", "damaged_shipping"],
    process: &[
        "Contact customer service to initiate return",
        "Receive return authorization number",
        "Package item securely with return label",
        "Drop off at shipping location or schedule pickup",
    ],
};

pub struct ExchangePolicy {
    pub period_days: i64,
    pub fee: f64,
}

pub const EXCHANGE_POLICY: ExchangePolicy = ExchangePolicy {
    period_days: 15,
    fee: 50.0,
};

pub const WARRANTY_EXCLUSIONS: &[&str] = &[
    "water damage",
    "user-caused physical damage",
    "software issues",
];

pub const WARRANTY_PROCESS: &[&str] = &[
    "Verify warranty status with order number",
    "Describe the issue in detail",
    "Perform basic troubleshooting steps",
    "If unresolved, arrange for repair or replacement",
];

/// 按保修年限给出覆盖范围
pub fn warranty_coverage(years: u32) -> &'static [&'static str] {
    match years {
        0 | 1 => &["manufacturing defects", "hardware failures"],
        2 => &["manufacturing defects", "hardware failures", "screen defects"],
        _ => &[
            "manufacturing defects",
            "hardware failures",
            "screen defects",
            "accidental damage",
        ],
    }
}

/// 问题类别 -> 解决方案模板
pub fn resolution_options(issue: &str) -> &'static [&'static str] {
    match issue {
        "delivery_delay" => &[
            "Expedite remaining shipment at no cost",
            "Provide tracking updates every 24 hours",
            "Offer store credit for inconvenience",
        ],
        "product_quality" => &[
            "Full replacement with expedited shipping",
            "Partial refund while keeping product",
            "Upgrade to higher-tier product at same price",
        ],
        "billing_issue" => &[
            "Correct billing and issue credit",
            "Waive any late fees or penalties",
            "Provide detailed billing explanation",
        ],
        _ => &[
            "Escalate to management for review",
            "Provide direct contact for future issues",
            "Offer goodwill gesture for poor experience",
        ],
    }
}

pub fn find_order(id: &str) -> Option<&'static Order> {
    ORDERS.iter().find(|o| o.id == id)
}

pub fn find_product(id: &str) -> Option<&'static Product> {
    PRODUCTS.iter().find(|p| p.id == id)
}

pub fn find_product_by_name(name: &str) -> Option<&'static Product> {
    PRODUCTS.iter().find(|p| p.name.eq_ignore_ascii_case(name))
}

pub fn troubleshooting_steps(issue_key: &str) -> &'static [&'static str] {
    KNOWLEDGE_BASE
        .iter()
        .find(|(k, _)| *k == issue_key)
        .map(|(_, steps)| *steps)
        .unwrap_or(GENERAL_STEPS)
}

pub(crate) fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

/// 距今天数（负数表示已过去）
pub(crate) fn days_until(s: &str) -> Option<i64> {
    parse_date(s).map(|d| (d - Utc::now().date_naive()).num_days())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orders_reference_known_products() {
        for order in ORDERS {
            assert!(find_product(order.product_id).is_some(), "{}", order.id);
            assert!(parse_date(order.order_date).is_some());
            assert!(parse_date(order.warranty_expires).is_some());
        }
    }

    #[test]
    fn test_unknown_issue_falls_back_to_general_steps() {
        assert_eq!(troubleshooting_steps("kettle_whistling"), GENERAL_STEPS);
        assert!(troubleshooting_steps("laptop_wont_turn_on")[0].contains("power adapter"));
    }

    #[test]
    fn test_availability_tiers() {
        let air = find_product_by_name("techbook air 13").unwrap();
        assert_eq!(air.availability(), "In Stock");
        let gaming = find_product("TB-GAME-17").unwrap();
        assert_eq!(gaming.availability(), "Limited Stock");
        assert_eq!(gaming.price_tier(), "High-End");
    }
}
