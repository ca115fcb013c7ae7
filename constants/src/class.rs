/// Default classification dictionary, in training index order.
pub struct ClassInfo {
    pub code: u8,
    pub name: &'static str,
}

pub const CLASS_MAP: &[ClassInfo] = &[
    ClassInfo {
        code: 1,
        name: "unclassified",
    },
    ClassInfo {
        code: 2,
        name: "ground",
    },
    ClassInfo {
        code: 3,
        name: "vegetation - low",
    },
    ClassInfo {
        code: 4,
        name: "vegetation - medium",
    },
    ClassInfo {
        code: 5,
        name: "vegetation - high",
    },
    ClassInfo {
        code: 6,
        name: "building",
    },
    ClassInfo {
        code: 9,
        name: "water",
    },
];

/// Codes folded into another code before training index lookup.
/// Bridges, virtual points and noise collapse into "unclassified".
pub const CLASS_PREPROCESSING_MAP: &[(u8, u8)] =
    &[(0, 1), (7, 1), (17, 1), (64, 1), (65, 1), (66, 1)];

pub fn get_class_name(code: u8) -> String {
    CLASS_MAP
        .iter()
        .find(|c| c.code == code)
        .map_or("unknown", |c| c.name)
        .to_string()
}
