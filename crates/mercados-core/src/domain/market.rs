//! Tracked markets and the instrument universe.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Symbol, ValidationError};

/// Index a tracked instrument belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Market {
    #[serde(rename = "IBEX_35")]
    Ibex35,
    #[serde(rename = "COLCAP")]
    Colcap,
}

impl Market {
    pub const ALL: [Self; 2] = [Self::Ibex35, Self::Colcap];

    /// Code stored in the `market` column.
    pub const fn code(self) -> &'static str {
        match self {
            Self::Ibex35 => "IBEX_35",
            Self::Colcap => "COLCAP",
        }
    }

    /// Member tickers, in index order.
    pub const fn tickers(self) -> &'static [&'static str] {
        match self {
            Self::Ibex35 => IBEX_35,
            Self::Colcap => COLCAP,
        }
    }
}

impl Display for Market {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Market {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_uppercase().replace('-', "_");
        match normalized.as_str() {
            "IBEX_35" | "IBEX35" | "IBEX" => Ok(Self::Ibex35),
            "COLCAP" => Ok(Self::Colcap),
            _ => Err(ValidationError::UnknownMarket {
                value: value.to_string(),
            }),
        }
    }
}

const IBEX_35: &[&str] = &[
    "ANA.MC", "ACX.MC", "ACS.MC", "AENA.MC", "AMS.MC", "MTS.MC", "BBVA.MC", "BKT.MC", "CABK.MC",
    "CLNX.MC", "CIE.MC", "ENG.MC", "ELE.MC", "FER.MC", "FDR.MC", "GRF.MC", "IAG.MC", "IBE.MC",
    "ITX.MC", "IDR.MC", "LOG.MC", "MAP.MC", "MEL.MC", "MRL.MC", "NTGY.MC", "PHM.MC", "RED.MC",
    "REP.MC", "ROVI.MC", "SAB.MC", "SAN.MC", "SLR.MC", "TEF.MC", "UNI.MC", "VIS.MC",
];

const COLCAP: &[&str] = &[
    "NUTRESA.CL",
    "GRUBOLIVAR.CL",
    "PEI.CL",
    "CIBEST.CL",
    "GXTESCOL.CL",
    "PFCIBEST.CL",
    "GRUPOSURA.CL",
    "PFGRUPSURA.CL",
    "BOGOTA.CL",
    "PFDAVVNDA.CL",
    "ISA.CL",
    "HCOLSEL.CL",
    "ICOLCAP.CL",
    "CORFICOLCF.CL",
    "GRUPOARGOS.CL",
    "PFCORFICOL.CL",
    "TERPEL.CL",
    "BVC.CL",
    "PFCEMARGOS.CL",
    "PFGRUPOARG.CL",
    "CEMARGOS.CL",
    "MINEROS.CL",
    "PROMIGAS.CL",
    "CNEC.CL",
    "CELSIA.CL",
    "EXITO.CL",
    "GEB.CL",
    "ECOPETROL.CL",
    "GRUPOAVAL.CL",
    "PFAVAL.CL",
    "CONCONCRET.CL",
    "BHI.CL",
    "ENKA.CL",
];

/// One tracked ticker and the market it is reported under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instrument {
    pub symbol: Symbol,
    pub market: Market,
}

impl Instrument {
    pub fn new(symbol: Symbol, market: Market) -> Self {
        Self { symbol, market }
    }
}

/// Instruments of the given markets, market by market in index order.
///
/// A ticker listed in more than one market is kept only under the first.
pub fn universe(markets: &[Market]) -> Result<Vec<Instrument>, ValidationError> {
    let mut instruments: Vec<Instrument> = Vec::new();
    for market in markets {
        for ticker in market.tickers() {
            let symbol = Symbol::parse(ticker)?;
            if instruments.iter().all(|known| known.symbol != symbol) {
                instruments.push(Instrument::new(symbol, *market));
            }
        }
    }
    Ok(instruments)
}
