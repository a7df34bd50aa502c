//! Calibration tables for the controller's raw sensor codes.
//!
//! All tables are fixed at compile time. A lookup miss is a valid outcome
//! (reading outside the calibrated range), not an error.

/// Room temperature: big-endian byte pair at frame offsets 20..22 → tenths of °F.
///
/// Covers 60.0–85.0 °F. Sorted by code so lookups can binary search.
static TEMPERATURE_TABLE: [(u16, u16); 251] = [
    (0xA408, 600), (0xA509, 601), (0xA50A, 602), (0xA50B, 603), (0xA50C, 604), (0xA50D, 605),
    (0xA50E, 606), (0xA50F, 607), (0xA600, 608), (0xA601, 609), (0xA602, 610), (0xA603, 611),
    (0xA604, 612), (0xA605, 613), (0xA606, 614), (0xA607, 615), (0xA608, 616), (0xA609, 617),
    (0xA60A, 618), (0xA60B, 619), (0xA60C, 620), (0xA60D, 621), (0xA60E, 622), (0xA60F, 623),
    (0xA700, 624), (0xA701, 625), (0xA702, 626), (0xA703, 627), (0xA704, 628), (0xA705, 629),
    (0xA706, 630), (0xA707, 631), (0xA708, 632), (0xA709, 633), (0xA70A, 634), (0xA70B, 635),
    (0xA70C, 636), (0xA70D, 637), (0xA70E, 638), (0xA70F, 639), (0xA800, 640), (0xA801, 641),
    (0xA802, 642), (0xA803, 643), (0xA804, 644), (0xA805, 645), (0xA806, 646), (0xA807, 647),
    (0xA808, 648), (0xA809, 649), (0xA80A, 650), (0xA80B, 651), (0xA80C, 652), (0xA80D, 653),
    (0xA80E, 654), (0xA80F, 655), (0xA900, 656), (0xA901, 657), (0xA902, 658), (0xA903, 659),
    (0xA904, 660), (0xA905, 661), (0xA906, 662), (0xA907, 663), (0xA908, 664), (0xA909, 665),
    (0xA90A, 666), (0xA90B, 667), (0xA90C, 668), (0xA90D, 669), (0xA90E, 670), (0xA90F, 671),
    (0xAA00, 672), (0xAA01, 673), (0xAA02, 674), (0xAA03, 675), (0xAA04, 676), (0xAA05, 677),
    (0xAA06, 678), (0xAA07, 679), (0xAA08, 680), (0xAA09, 681), (0xAA0A, 682), (0xAA0B, 683),
    (0xAA0C, 684), (0xAA0D, 685), (0xAA0E, 686), (0xAA0F, 687), (0xAB00, 688), (0xAB01, 689),
    (0xAB02, 690), (0xAB03, 691), (0xAB04, 692), (0xAB05, 693), (0xAB06, 694), (0xAB07, 695),
    (0xAB08, 696), (0xAB09, 697), (0xAB0A, 698), (0xAB0B, 699), (0xAB0C, 700), (0xAB0D, 701),
    (0xAB0E, 702), (0xAB0F, 703), (0xAC00, 704), (0xAC01, 705), (0xAC02, 706), (0xAC03, 707),
    (0xAC04, 708), (0xAC05, 709), (0xAC06, 710), (0xAC07, 711), (0xAC08, 712), (0xAC09, 713),
    (0xAC0A, 714), (0xAC0B, 715), (0xAC0C, 716), (0xAC0D, 717), (0xAC0E, 718), (0xAC0F, 719),
    (0xAD00, 720), (0xAD01, 721), (0xAD02, 722), (0xAD03, 723), (0xAD04, 724), (0xAD05, 725),
    (0xAD06, 726), (0xAD07, 727), (0xAD08, 728), (0xAD09, 729), (0xAD0A, 730), (0xAD0B, 731),
    (0xAD0C, 732), (0xAD0D, 733), (0xAD0E, 734), (0xAD0F, 735), (0xAE00, 736), (0xAE01, 737),
    (0xAE02, 738), (0xAE03, 739), (0xAE04, 740), (0xAE05, 741), (0xAE06, 742), (0xAE07, 743),
    (0xAE08, 744), (0xAE09, 745), (0xAE0A, 746), (0xAE0B, 747), (0xAE0C, 748), (0xAE0D, 749),
    (0xAE0E, 750), (0xAE0F, 751), (0xAF00, 752), (0xAF01, 753), (0xAF02, 754), (0xAF03, 755),
    (0xAF04, 756), (0xAF05, 757), (0xAF06, 758), (0xAF07, 759), (0xAF08, 760), (0xAF09, 761),
    (0xAF0A, 762), (0xAF0B, 763), (0xAF0C, 764), (0xAF0D, 765), (0xAF0E, 766), (0xAF0F, 767),
    (0xB000, 768), (0xB001, 769), (0xB002, 770), (0xB003, 771), (0xB004, 772), (0xB005, 773),
    (0xB006, 774), (0xB007, 775), (0xB008, 776), (0xB009, 777), (0xB00A, 778), (0xB00B, 779),
    (0xB00C, 780), (0xB00D, 781), (0xB00E, 782), (0xB00F, 783), (0xB100, 784), (0xB101, 785),
    (0xB102, 786), (0xB103, 787), (0xB104, 788), (0xB105, 789), (0xB106, 790), (0xB107, 791),
    (0xB108, 792), (0xB109, 793), (0xB10A, 794), (0xB10B, 795), (0xB10C, 796), (0xB10D, 797),
    (0xB10E, 798), (0xB10F, 799), (0xB200, 800), (0xB201, 801), (0xB202, 802), (0xB203, 803),
    (0xB204, 804), (0xB205, 805), (0xB206, 806), (0xB207, 807), (0xB208, 808), (0xB209, 809),
    (0xB20A, 810), (0xB20B, 811), (0xB20C, 812), (0xB20D, 813), (0xB20E, 814), (0xB20F, 815),
    (0xB300, 816), (0xB301, 817), (0xB302, 818), (0xB303, 819), (0xB304, 820), (0xB305, 821),
    (0xB306, 822), (0xB307, 823), (0xB308, 824), (0xB309, 825), (0xB30A, 826), (0xB30B, 827),
    (0xB30C, 828), (0xB30D, 829), (0xB30E, 830), (0xB30F, 831), (0xB400, 832), (0xB401, 833),
    (0xB402, 834), (0xB403, 835), (0xB404, 836), (0xB405, 837), (0xB406, 838), (0xB407, 839),
    (0xB408, 840), (0xB409, 841), (0xB40A, 842), (0xB40B, 843), (0xB40C, 844), (0xB40D, 845),
    (0xB40E, 846), (0xB40F, 847), (0xB500, 848), (0xB501, 849), (0xB502, 850),
];

/// Setpoint: frame byte 17 → whole °F (60–85).
static SETPOINT_TABLE: [(u8, u8); 26] = [
    (0x94, 60), (0x95, 61), (0x96, 62), (0x97, 63), (0x98, 64), (0x99, 65),
    (0x9A, 66), (0x9B, 67), (0x9C, 68), (0x9D, 69), (0x9E, 70), (0x9F, 71),
    (0xA0, 72), (0xA1, 73), (0xA2, 74), (0xA3, 75), (0xA4, 76), (0xA5, 77),
    (0xA6, 78), (0xA7, 79), (0xA8, 80), (0xA9, 81), (0xAA, 82), (0xAB, 83),
    (0xAC, 84), (0xAD, 85),
];

/// Relay combination: frame byte 18 → LEM/HVAC relay description.
static HVAC_TABLE: [(u8, &str); 13] = [
    (0x04, "LEM OFF + HVAC OFF"),
    (0x06, "LEM OFF + HVAC ON"),
    (0x07, "LEM OFF + HVAC ON"),
    (0x08, "LEM OFF + HVAC OFF"),
    (0x0B, "LEM OFF + HVAC ON"),
    (0x0C, "LEM OFF + HVAC OFF"),
    (0x0E, "LEM OFF + HVAC ON"),
    (0x0F, "LEM OFF + HVAC ON"),
    (0x17, "LEM ON + HVAC ON"),
    (0x1B, "LEM ON + HVAC ON"),
    (0x1C, "LEM ON + HVAC OFF"),
    (0x1E, "LEM ON + HVAC ON"),
    (0x1F, "LEM ON + HVAC ON"),
];

/// Room temperature in °F for a raw byte-pair code.
pub fn temperature(code: u16) -> Option<f64> {
    TEMPERATURE_TABLE
        .binary_search_by_key(&code, |&(c, _)| c)
        .ok()
        .map(|i| f64::from(TEMPERATURE_TABLE[i].1) / 10.0)
}

/// Same as [`temperature`], keyed by the 4-character hex form (e.g. `"AD00"`).
pub fn temperature_for_key(key: &str) -> Option<f64> {
    if key.len() != 4 {
        return None;
    }
    u16::from_str_radix(key, 16).ok().and_then(temperature)
}

/// Setpoint in °F for a raw byte code.
pub fn setpoint(code: u8) -> Option<f64> {
    SETPOINT_TABLE
        .binary_search_by_key(&code, |&(c, _)| c)
        .ok()
        .map(|i| f64::from(SETPOINT_TABLE[i].1))
}

/// Relay description, or `Unknown(XX)` for codes outside the table.
pub fn hvac_state(code: u8) -> String {
    match HVAC_TABLE.binary_search_by_key(&code, |&(c, _)| c) {
        Ok(i) => HVAC_TABLE[i].1.to_owned(),
        Err(_) => format!("Unknown({code:02X})"),
    }
}
