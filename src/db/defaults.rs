//! Built-in survey tables and their default column mappings.
//!
//! These seed a fresh working database: the forest point-count sheet
//! (`shumske`), the sand martin colony count (`bregunice`) and the
//! naturalist observation export (`naturalist`).

use crate::types::{MappingSet, TableMapping};

/// Survey tables created on bootstrap when missing.
pub const SURVEY_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS bregunice (
    lokalitet NVARCHAR(50),
    maks_broj_jedinki INTEGER,
    kvalitet_brojanja NVARCHAR(50),
    ukupan_broj_rupa_u_koloniji INTEGER,
    broj_aktivnih_rupa_u_koloniji INTEGER,
    kvalitet_brojanja_1 NVARCHAR(50),
    datum NVARCHAR(50),
    period_osmatranja NVARCHAR(50),
    latituda REAL,
    longituda REAL,
    staniste VARCHAR(50),
    ugrozavanje VARCHAR(50),
    temperatura VARCHAR(50),
    brzina_vetra VARCHAR(50),
    napomena NVARCHAR(256),
    popisivac VARCHAR(128)
);

CREATE TABLE IF NOT EXISTS naturalist (
    "species" VARCHAR(50),
    "Date" VARCHAR(50),
    "Day" VARCHAR(50),
    "Month" VARCHAR(50),
    "Year" VARCHAR(50),
    "Timing" VARCHAR(50),
    "Latitude (N)" VARCHAR(50),
    "Longitude (E)" VARCHAR(50),
    "Latitude (DMS)" VARCHAR(50),
    "Longitude (DMS)" VARCHAR(50),
    "Altitude" VARCHAR(50),
    "Estimation" VARCHAR(50),
    "Number" VARCHAR(50),
    "Details" VARCHAR(50),
    "Altas code" VARCHAR(50),
    "Comment" VARCHAR(50),
    "Observer" VARCHAR(50)
);

CREATE TABLE IF NOT EXISTS shumske (
    ime_tacke VARCHAR(50),
    latituda REAL,
    longituda REAL,
    planina VARCHAR(50),
    datum NVARCHAR(50),
    period_osmatranja NVARCHAR(50),
    vrsta VARCHAR(50),
    broj VARCHAR(50),
    ex_p_m_g_f VARCHAR(50),
    atlas_kod VARCHAR(50),
    dozivane_vrste VARCHAR(50),
    tip_sume VARCHAR(50),
    status_sume VARCHAR(50),
    podrast VARCHAR(64),
    napomena_o_stanistu VARCHAR(64),
    ekspozicija VARCHAR(50),
    oblacnost INTEGER,
    vetar INTEGER,
    temperatura INTEGER,
    napomena VARCHAR(50),
    popisivaci VARCHAR(50)
);
"#;

/// Names of the built-in survey tables.
pub const SURVEY_TABLES: &[&str] = &["shumske", "bregunice", "naturalist"];

fn shumske() -> TableMapping {
    TableMapping::from_pairs([
        ("ime_tacke", vec!["Ime tačke", "Ime tacke"]),
        ("latituda", vec!["Latituda", "Lat"]),
        ("longituda", vec!["Longituda", "Lon"]),
        ("planina", vec!["Planina", "Planina (dopisati)"]),
        ("datum", vec!["Datum"]),
        ("period_osmatranja", vec!["Period osmatranja"]),
        ("vrsta", vec!["Vrsta"]),
        ("broj", vec!["Broj"]),
        ("ex_p_m_g_f", vec!["ex/p/m/g/f"]),
        ("atlas_kod", vec!["Atlas kod"]),
        ("dozivane_vrste", vec!["Dozivane vrste"]),
        ("tip_sume", vec!["Tip šume ", "Tip sume"]),
        ("status_sume", vec!["Status šume", "Status sume"]),
        ("podrast", vec!["Podrast", "Podrast (nabrojati)"]),
        ("napomena_o_stanistu", vec!["Napomena o staništu", "Napomena o stanistu"]),
        ("ekspozicija", vec!["Ekspozicija ", "Ekspozicija"]),
        ("oblacnost", vec!["Oblačnost", "Oblacnost"]),
        ("vetar", vec!["Vetar"]),
        ("temperatura", vec!["Temperatura"]),
        ("napomena", vec!["Napomena"]),
        ("popisivaci", vec!["Popisivači", "Popisivaci"]),
    ])
}

fn bregunice() -> TableMapping {
    TableMapping::from_pairs([
        ("lokalitet", vec!["Lokalitet"]),
        ("maks_broj_jedinki", vec!["Maks. broj jedinki"]),
        ("kvalitet_brojanja", vec!["Kvalitet brojanja"]),
        ("ukupan_broj_rupa_u_koloniji", vec!["Ukupan broj rupa u koloniji"]),
        ("broj_aktivnih_rupa_u_koloniji", vec!["Broj aktivnih rupa u koloniji"]),
        ("kvalitet_brojanja_1", vec!["Kvalitet brojanja_1"]),
        ("datum", vec!["Datum"]),
        ("period_osmatranja", vec!["Period osmatranja"]),
        ("latituda", vec!["Latituda"]),
        ("longituda", vec!["Longituda"]),
        ("staniste", vec!["Stanište", "Staniste"]),
        ("ugrozavanje", vec!["Ugrožavanje", "Ugrozavanje"]),
        ("temperatura", vec!["Temperatura"]),
        ("brzina_vetra", vec!["Brzina vetra"]),
        ("napomena", vec!["Napomena"]),
        ("popisivac", vec!["Popisivač", "Popisivac"]),
    ])
}

fn naturalist() -> TableMapping {
    TableMapping::from_pairs([
        ("species", vec!["Naučni naziv", "Latin name", "Naucni naziv"]),
        ("Date", vec!["Datum"]),
        ("Day", vec!["Dan"]),
        ("Month", vec!["Mesec"]),
        ("Year", vec!["Godina"]),
        ("Timing", vec!["Vreme"]),
        ("Latitude (N)", vec!["Latituda (N)"]),
        ("Longitude (E)", vec!["Longituda (E)"]),
        ("Latitude (DMS)", vec!["Latituda (DMS)"]),
        ("Longitude (DMS)", vec!["Longituda (DMS)"]),
        ("Altitude", vec!["Nadmorska visina"]),
        ("Estimation", vec!["Procena"]),
        ("Number", vec!["Broj"]),
        ("Details", vec!["Detalji"]),
        ("Altas code", vec!["Atlas kod"]),
        ("Comment", vec!["Komentar"]),
        ("Observer", vec!["Posmatrači", "Posmatraci"]),
    ])
}

/// Default mappings for the built-in survey tables.
pub fn default_mappings() -> MappingSet {
    let mut set = MappingSet::new();
    set.insert("shumske".to_string(), shumske());
    set.insert("bregunice".to_string(), bregunice());
    set.insert("naturalist".to_string(), naturalist());
    set
}

pub fn default_main_tables() -> Vec<String> {
    SURVEY_TABLES.iter().map(|t| t.to_string()).collect()
}
