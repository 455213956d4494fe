//! Bin categories and localized disposal guidance
//!
//! Every [`WasteClass`] maps to exactly one [`BinCategory`]. Guidance text is
//! available in English and Vietnamese; the hazardous bin additionally calls
//! for a modal warning on the consumer side.

use crate::types::WasteClass;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Disposal bin a class belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinCategory {
    Recyclable,
    Organic,
    Hazardous,
    General,
}

impl BinCategory {
    pub const ALL: [BinCategory; 4] = [
        BinCategory::Recyclable,
        BinCategory::Organic,
        BinCategory::Hazardous,
        BinCategory::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BinCategory::Recyclable => "recyclable",
            BinCategory::Organic => "organic",
            BinCategory::Hazardous => "hazardous",
            BinCategory::General => "general",
        }
    }

    /// Bin colour used by frontends
    pub fn color(&self) -> &'static str {
        match self {
            BinCategory::Recyclable => "#3b82f6",
            BinCategory::Organic => "#f59e0b",
            BinCategory::Hazardous => "#ef4444",
            BinCategory::General => "#6b7280",
        }
    }

    pub fn requires_warning(&self) -> bool {
        matches!(self, BinCategory::Hazardous)
    }

    pub fn display_name(&self, locale: Locale) -> &'static str {
        match (self, locale) {
            (BinCategory::Recyclable, Locale::En) => "Recyclable",
            (BinCategory::Organic, Locale::En) => "Organic",
            (BinCategory::Hazardous, Locale::En) => "Hazardous",
            (BinCategory::General, Locale::En) => "General waste",
            (BinCategory::Recyclable, Locale::Vi) => "Tái chế",
            (BinCategory::Organic, Locale::Vi) => "Hữu cơ",
            (BinCategory::Hazardous, Locale::Vi) => "Nguy hại",
            (BinCategory::General, Locale::Vi) => "Rác thường",
        }
    }

    pub fn instruction(&self, locale: Locale) -> &'static str {
        match (self, locale) {
            (BinCategory::Recyclable, Locale::En) => {
                "Rinse it clean and put it in the blue recycling bin"
            }
            (BinCategory::Organic, Locale::En) => {
                "Put it in the organic bin (food scraps, vegetables) for composting"
            }
            (BinCategory::Hazardous, Locale::En) => {
                "Needs special handling. Take it to a hazardous waste collection point or contact the local environment office"
            }
            (BinCategory::General, Locale::En) => "Put it in the grey general waste bin",
            (BinCategory::Recyclable, Locale::Vi) => "Rửa sạch và bỏ vào thùng xanh tái chế",
            (BinCategory::Organic, Locale::Vi) => {
                "Bỏ vào thùng rác hữu cơ (rau củ, thức ăn thừa) để ủ phân compost"
            }
            (BinCategory::Hazardous, Locale::Vi) => {
                "Cần xử lý đặc biệt. Đưa đến điểm thu gom rác nguy hại hoặc liên hệ cơ quan môi trường địa phương"
            }
            (BinCategory::General, Locale::Vi) => "Bỏ vào thùng rác màu xám",
        }
    }
}

impl fmt::Display for BinCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Language guidance is rendered in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Vi,
}

impl WasteClass {
    pub fn display_name(&self, locale: Locale) -> &'static str {
        match locale {
            Locale::En => match self {
                WasteClass::Battery => "Battery",
                WasteClass::Biological => "Organic matter",
                WasteClass::Cardboard => "Cardboard",
                WasteClass::Glass => "Glass",
                WasteClass::Metal => "Metal",
                WasteClass::Paper => "Paper",
                WasteClass::Plastic => "Plastic",
                WasteClass::Textile => "Textile",
                WasteClass::Trash => "General trash",
            },
            Locale::Vi => match self {
                WasteClass::Battery => "Pin",
                WasteClass::Biological => "Hữu cơ",
                WasteClass::Cardboard => "Hộp giấy",
                WasteClass::Glass => "Thủy tinh",
                WasteClass::Metal => "Kim loại",
                WasteClass::Paper => "Giấy",
                WasteClass::Plastic => "Nhựa",
                WasteClass::Textile => "Vải",
                WasteClass::Trash => "Rác thải",
            },
        }
    }

    /// Short preparation steps before disposal
    pub fn recycling_tips(&self, locale: Locale) -> &'static [&'static str] {
        match locale {
            Locale::En => match self {
                WasteClass::Battery => &[
                    "Never throw batteries in the household bin",
                    "Tape the terminals of lithium batteries",
                    "Drop them at a battery collection point",
                ],
                WasteClass::Biological => &[
                    "Remove plastic bags and packaging",
                    "Drain excess liquid",
                    "Compost or use the organic bin",
                ],
                WasteClass::Cardboard => &[
                    "Remove tape and labels",
                    "Flatten boxes",
                    "Greasy cardboard goes to general waste",
                ],
                WasteClass::Glass => &[
                    "Rinse bottles and jars",
                    "Remove metal or plastic caps",
                    "Wrap broken glass before disposal",
                ],
                WasteClass::Metal => &[
                    "Rinse cans",
                    "Crush cans to save space",
                    "Keep aerosol cans separate",
                ],
                WasteClass::Paper => &[
                    "Keep paper dry and clean",
                    "Remove clips, staples and tape",
                    "Paper can be recycled 5 to 7 times",
                ],
                WasteClass::Plastic => &[
                    "Rinse bottles and containers",
                    "Remove caps and labels when possible",
                    "Flatten to save space",
                ],
                WasteClass::Textile => &[
                    "Donate wearable clothes",
                    "Keep textiles dry",
                    "Use textile collection bins where available",
                ],
                WasteClass::Trash => &[
                    "Bag it securely",
                    "Check for recyclable parts first",
                ],
            },
            Locale::Vi => match self {
                WasteClass::Battery => &[
                    "Không bỏ pin vào thùng rác sinh hoạt",
                    "Dán băng keo hai cực pin lithium",
                    "Mang đến điểm thu gom pin",
                ],
                WasteClass::Biological => &[
                    "Bỏ túi ni lông và bao bì",
                    "Để ráo nước",
                    "Ủ phân hoặc bỏ vào thùng hữu cơ",
                ],
                WasteClass::Cardboard => &[
                    "Loại bỏ băng dính và nhãn",
                    "Làm phẳng hộp carton",
                    "Hộp dính mỡ bỏ vào rác thường",
                ],
                WasteClass::Glass => &[
                    "Rửa sạch chai lọ",
                    "Tháo nắp kim loại hoặc nhựa",
                    "Gói kỹ thủy tinh vỡ trước khi bỏ",
                ],
                WasteClass::Metal => &[
                    "Rửa sạch lon",
                    "Ép dẹp lon để tiết kiệm chỗ",
                    "Để riêng bình xịt",
                ],
                WasteClass::Paper => &[
                    "Giữ giấy khô ráo và sạch sẽ",
                    "Tháo bỏ kẹp giấy, ghim, băng dính",
                    "Giấy có thể tái chế 5-7 lần",
                ],
                WasteClass::Plastic => &[
                    "Rửa sạch chai/hộp nhựa trước khi bỏ",
                    "Tháo nắp và nhãn nếu có thể",
                    "Ép dẹp để tiết kiệm không gian",
                ],
                WasteClass::Textile => &[
                    "Quyên góp quần áo còn dùng được",
                    "Giữ vải khô ráo",
                    "Dùng thùng thu gom vải nếu có",
                ],
                WasteClass::Trash => &[
                    "Buộc túi cẩn thận",
                    "Kiểm tra phần có thể tái chế trước",
                ],
            },
        }
    }

    /// Full guidance bundle for this class
    pub fn guidance(&self, locale: Locale) -> Guidance {
        Guidance::for_class(*self, locale)
    }
}

/// Disposal guidance shown once a detection is stable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guidance {
    pub class: WasteClass,
    pub class_name: String,
    pub bin: BinCategory,
    pub bin_name: String,
    pub instruction: String,
    pub color: String,
    pub tips: Vec<String>,
    pub hazard_warning: bool,
    pub locale: Locale,
}

impl Guidance {
    pub fn for_class(class: WasteClass, locale: Locale) -> Self {
        let bin = class.bin_category();
        Self {
            class,
            class_name: class.display_name(locale).to_string(),
            bin,
            bin_name: bin.display_name(locale).to_string(),
            instruction: bin.instruction(locale).to_string(),
            color: bin.color().to_string(),
            tips: class
                .recycling_tips(locale)
                .iter()
                .map(|t| t.to_string())
                .collect(),
            hazard_warning: bin.requires_warning(),
            locale,
        }
    }
}
