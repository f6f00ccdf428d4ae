//! Static ENTSO-E code tables: bidding areas, production types and transfer neighbours.

/// A bidding zone as addressed by the ENTSO-E transparency platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Area {
    pub code: &'static str,
    pub name: &'static str,
    pub country: &'static str,
}

/// National domain used for Swedish totals.
pub const SWEDEN: &str = "10YSE-1--------K";

pub const AREAS: &[Area] = &[
    Area { code: "10Y1001A1001A44P", name: "SE1", country: "SE" },
    Area { code: "10Y1001A1001A45N", name: "SE2", country: "SE" },
    Area { code: "10Y1001A1001A46L", name: "SE3", country: "SE" },
    Area { code: "10Y1001A1001A47J", name: "SE4", country: "SE" },
    // Transfer neighbours
    Area { code: "10YFI-1--------U", name: "FI", country: "FI" },
    Area { code: "10YNO-1--------2", name: "NO1", country: "NO" },
    Area { code: "10YNO-3--------J", name: "NO3", country: "NO" },
    Area { code: "10YNO-4--------9", name: "NO4", country: "NO" },
    Area { code: "10YDK-1--------W", name: "DK1", country: "DK" },
    Area { code: "10YDK-2--------M", name: "DK2", country: "DK" },
    Area { code: "10Y1001A1001A63L", name: "DE_AT_LU", country: "DE" },
    Area { code: "10Y1001A1001A82H", name: "DE_LU", country: "DE" },
    Area { code: "10YLT-1001A0008Q", name: "LT", country: "LT" },
    Area { code: "10YPL-AREA-----S", name: "PL", country: "PL" },
];

pub fn area_by_code(code: &str) -> Option<&'static Area> {
    AREAS.iter().find(|area| area.code == code)
}

pub fn area_by_name(name: &str) -> Option<&'static Area> {
    AREAS.iter().find(|area| area.name == name)
}

pub fn swedish_areas() -> impl Iterator<Item = &'static Area> {
    AREAS.iter().filter(|area| area.country == "SE")
}

/// Maps an ENTSO-E production type (`B01`..`B24`) to the energy type it is reported under.
pub fn energy_type(psr_type: &str) -> Option<&'static str> {
    let energy_type = match psr_type {
        // Biomass, fossil fuels, geothermal and waste
        "B01" | "B02" | "B03" | "B04" | "B05" | "B06" | "B07" | "B08" | "B09" | "B17" => {
            "Värmekraft"
        }
        // Pumped storage, run-of-river, reservoir
        "B10" | "B11" | "B12" => "Vattenkraft",
        "B14" => "Kärnkraft",
        "B16" => "Solkraft",
        // Offshore and onshore wind
        "B18" | "B19" => "Vindkraft",
        // Marine, other renewable, other and grid equipment
        "B13" | "B15" | "B20" | "B21" | "B22" | "B23" | "B24" => "Ospecificerat",
        _ => return None,
    };
    Some(energy_type)
}

/// Areas that exchange power with the given Swedish area.
pub fn transfer_neighbours(area: &str) -> &'static [&'static str] {
    match area {
        "SE1" => &["SE2", "FI", "NO4"],
        "SE2" => &["SE1", "SE3", "NO3", "NO4"],
        "SE3" => &["SE2", "SE4", "DK1", "FI", "NO1"],
        "SE4" => &["SE3", "DE_AT_LU", "DE_LU", "DK2", "LT", "PL"],
        _ => &[],
    }
}
