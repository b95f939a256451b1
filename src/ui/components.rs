use serenity::builder::{
    CreateActionRow, CreateSelectMenu, CreateSelectMenuKind, CreateSelectMenuOption,
};

use super::truncate;
use crate::catalog::{Station, StationCatalog};

/// custom_id del selector de estaciones de `/play`
pub const STATION_SELECT: &str = "station_select";

/// Límites de Discord para menús de selección
pub const MAX_OPTIONS: usize = 25;
const MAX_TEXT: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct StationOption {
    pub label: String,
    /// Índice dentro del catálogo (el catálogo no cambia en tiempo de ejecución)
    pub value: String,
    pub description: String,
}

pub fn station_options(catalog: &StationCatalog) -> Vec<StationOption> {
    catalog
        .stations()
        .iter()
        .enumerate()
        .take(MAX_OPTIONS)
        .map(|(index, station)| StationOption {
            label: truncate(&station.name, MAX_TEXT),
            value: index.to_string(),
            description: station.stream_url.as_str().chars().take(MAX_TEXT).collect(),
        })
        .collect()
}

/// Estación elegida en el selector.
pub fn selected_station<'a>(catalog: &'a StationCatalog, value: &str) -> Option<&'a Station> {
    value
        .parse::<usize>()
        .ok()
        .and_then(|index| catalog.stations().get(index))
}

/// Selector de estaciones. `None` si el catálogo está vacío.
pub fn create_station_select(catalog: &StationCatalog) -> Option<Vec<CreateActionRow>> {
    let options: Vec<CreateSelectMenuOption> = station_options(catalog)
        .into_iter()
        .map(|opt| CreateSelectMenuOption::new(opt.label, opt.value).description(opt.description))
        .collect();

    if options.is_empty() {
        return None;
    }

    let menu = CreateSelectMenu::new(STATION_SELECT, CreateSelectMenuKind::String { options })
        .placeholder("📻 Elige una estación")
        .min_values(1)
        .max_values(1);

    Some(vec![CreateActionRow::SelectMenu(menu)])
}
