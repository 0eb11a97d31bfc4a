use std::{
    fs::File,
    io::{BufRead, BufReader},
    mem,
    path::Path,
    str::FromStr,
};

use log::debug;

use crate::error::UaiError;

use super::table::TableEnergyFunction;

// States for reading UAI files
enum UaiState {
    ModelType,
    NumberOfVariables,
    DomainSizes,
    NumberOfFunctions,
    FunctionScopes(usize),            // function index
    NumberOfTableValues(usize),       // function index
    TableValues(usize, usize, usize), // function index, how many entries were read, function table size
    EndOfFile,
}

fn parse_values<T: FromStr>(line: &str, line_number: usize) -> Result<Vec<T>, UaiError> {
    line.split_whitespace()
        .map(|token| {
            token.parse::<T>().map_err(|_| UaiError::Parse {
                line: line_number,
                message: format!("cannot parse {:?}", token),
            })
        })
        .collect()
}

fn parse_single<T: FromStr>(line: &str, line_number: usize) -> Result<T, UaiError> {
    let mut values = parse_values(line, line_number)?;
    match values.len() {
        1 => Ok(values.remove(0)),
        count => Err(UaiError::Parse {
            line: line_number,
            message: format!("expected a single value, found {}", count),
        }),
    }
}

/// Reads a MARKOV model in UAI format from a file.
/// The format specification can be found [here](https://uaicompetition.github.io/uci-2022/file-formats/model-format/).
/// If `lg` is set, table entries are logarithms of potentials.
pub fn read_uai(path: impl AsRef<Path>, lg: bool) -> Result<TableEnergyFunction, UaiError> {
    debug!(
        "In read_uai() for file {:?} with lg option {}",
        path.as_ref(),
        lg
    );
    let file = File::open(path)?;
    from_reader(BufReader::new(file), lg)
}

/// Reads a MARKOV model in UAI format restricted to functions of arity at most 2.
///
/// Unary functions over the same variable multiply.
/// Pairwise functions become edges in the order they appear, oriented along their scope.
/// Functions without variables are constants and are skipped.
pub fn from_reader<R: BufRead>(reader: R, lg: bool) -> Result<TableEnergyFunction, UaiError> {
    let mut state = UaiState::ModelType;

    let mut domain_sizes: Vec<usize> = Vec::new();
    let mut function_scopes: Vec<Vec<usize>> = Vec::new();
    let mut function_count = 0;
    let mut function_entries = Vec::new();
    let mut unary: Vec<Option<Vec<f64>>> = Vec::new();
    let mut model = None;

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line_number = index + 1;
        let trimmed_line = line.trim();
        if trimmed_line.is_empty() {
            continue;
        }

        match state {
            UaiState::ModelType => {
                debug!("Reading model type");
                if trimmed_line != "MARKOV" {
                    return Err(UaiError::UnsupportedModelType(trimmed_line.to_string()));
                }
                state = UaiState::NumberOfVariables;
            }
            UaiState::NumberOfVariables => {
                debug!("Reading number of variables");
                let variable_count: usize = parse_single(trimmed_line, line_number)?;
                domain_sizes.reserve(variable_count);
                unary = vec![None; variable_count];
                state = UaiState::DomainSizes;
            }
            UaiState::DomainSizes => {
                debug!("Reading domain sizes");
                domain_sizes = parse_values(trimmed_line, line_number)?;
                if domain_sizes.len() != unary.len() {
                    return Err(UaiError::Parse {
                        line: line_number,
                        message: format!(
                            "expected {} domain sizes, found {}",
                            unary.len(),
                            domain_sizes.len()
                        ),
                    });
                }
                model = Some(TableEnergyFunction::from_domain_sizes(&domain_sizes)?);
                state = UaiState::NumberOfFunctions;
            }
            UaiState::NumberOfFunctions => {
                debug!("Reading number of functions");
                function_count = parse_single(trimmed_line, line_number)?;
                function_scopes = Vec::with_capacity(function_count);
                if let Some(model) = model.as_mut() {
                    model.reserve(function_count);
                }
                state = match function_count {
                    0 => UaiState::EndOfFile,
                    _ => UaiState::FunctionScopes(0),
                };
            }
            UaiState::FunctionScopes(function) => {
                debug!("Reading scope of function {}", function);
                let description: Vec<usize> = parse_values(trimmed_line, line_number)?;
                let (arity, scope) = description.split_first().ok_or_else(|| UaiError::Parse {
                    line: line_number,
                    message: "empty function scope".to_string(),
                })?;
                if *arity != scope.len() {
                    return Err(UaiError::Parse {
                        line: line_number,
                        message: format!(
                            "scope of arity {} lists {} variables",
                            arity,
                            scope.len()
                        ),
                    });
                }
                if *arity > 2 {
                    return Err(UaiError::UnsupportedArity {
                        function,
                        arity: *arity,
                    });
                }
                let out_of_range = scope.iter().find(|variable| **variable >= domain_sizes.len());
                if let Some(variable) = out_of_range {
                    return Err(UaiError::Parse {
                        line: line_number,
                        message: format!("variable {} does not exist", variable),
                    });
                }
                function_scopes.push(scope.to_vec());
                state = match function + 1 < function_count {
                    true => UaiState::FunctionScopes(function + 1),
                    false => UaiState::NumberOfTableValues(0),
                };
            }
            UaiState::NumberOfTableValues(function) => {
                debug!("Reading function table size of function {}", function);
                let entry_count: usize = parse_single(trimmed_line, line_number)?;
                let expected: usize = function_scopes[function]
                    .iter()
                    .map(|variable| domain_sizes[*variable])
                    .product();
                if entry_count != expected {
                    return Err(UaiError::Parse {
                        line: line_number,
                        message: format!(
                            "function {} needs {} entries, found {}",
                            function, expected, entry_count
                        ),
                    });
                }
                function_entries = Vec::with_capacity(entry_count);
                state = UaiState::TableValues(function, 0, entry_count);
            }
            UaiState::TableValues(function, collected, entry_count) => {
                let mut new_entries: Vec<f64> = parse_values(trimmed_line, line_number)?;
                let collected = collected + new_entries.len();
                function_entries.append(&mut new_entries);
                if collected > entry_count {
                    return Err(UaiError::Parse {
                        line: line_number,
                        message: format!("too many entries for function {}", function),
                    });
                }
                if collected < entry_count {
                    state = UaiState::TableValues(function, collected, entry_count);
                    continue;
                }
                debug!(
                    "Reading function {}. Collected all {} entries.",
                    function, entry_count
                );

                let mut table = mem::take(&mut function_entries);
                if lg {
                    table.iter_mut().for_each(|value| *value = value.exp());
                }

                let model = model
                    .as_mut()
                    .ok_or(UaiError::UnexpectedEof("domain sizes"))?;
                match function_scopes[function].as_slice() {
                    [] => debug!("Skipping constant function {}", function),
                    [variable] => {
                        let product: Vec<f64> = match unary[*variable].take() {
                            Some(previous) => {
                                previous.iter().zip(table).map(|(a, b)| a * b).collect()
                            }
                            None => table,
                        };
                        model.set_unary(*variable, product.clone())?;
                        unary[*variable] = Some(product);
                    }
                    [i, j] => {
                        model.add_pairwise_from_vec(*i, *j, table)?;
                    }
                    _ => unreachable!("arity is checked when reading scopes"),
                }

                state = match function + 1 < function_count {
                    true => UaiState::NumberOfTableValues(function + 1),
                    false => UaiState::EndOfFile,
                };
            }
            UaiState::EndOfFile => {
                return Err(UaiError::Parse {
                    line: line_number,
                    message: "unexpected content after the last function table".to_string(),
                });
            }
        }
    }

    match state {
        UaiState::EndOfFile => model.ok_or(UaiError::UnexpectedEof("domain sizes")),
        UaiState::ModelType | UaiState::NumberOfVariables => {
            Err(UaiError::UnexpectedEof("preamble"))
        }
        UaiState::DomainSizes => Err(UaiError::UnexpectedEof("domain sizes")),
        UaiState::NumberOfFunctions | UaiState::FunctionScopes(_) => {
            Err(UaiError::UnexpectedEof("function scopes"))
        }
        UaiState::NumberOfTableValues(_) | UaiState::TableValues(..) => {
            Err(UaiError::UnexpectedEof("function tables"))
        }
    }
}
