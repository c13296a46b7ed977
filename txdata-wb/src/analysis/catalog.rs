//! The analysis catalog
//!
//! Every analysis reads the working frame, labels categories through the
//! codebook and returns a rendered [`AnalysisResult`]. Type and shape
//! problems are reported as `Error::InvalidInput` so they surface as 400s.

use std::collections::HashMap;
use txdata_common::frame::format_number;
use txdata_common::{Column, Error, Frame, Result, Table};

use super::{AnalysisRequest, AnalysisResult, BarOrientation, PieStyle, PlotType};
use crate::charts::{self, Orientation};
use crate::encoding::Codebook;
use crate::stats;

fn invalid(message: String) -> Error {
    Error::InvalidInput(message)
}

fn fixed(value: f64, digits: usize) -> String {
    format!("{:.*}", digits, value)
}

fn fixed_or_na(value: Option<f64>, digits: usize) -> String {
    value.map(|v| fixed(v, digits)).unwrap_or_else(|| "N/A".to_string())
}

fn percent(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 * 100.0 / total as f64
    }
}

fn stars(p: f64) -> &'static str {
    if p < 0.001 {
        "***"
    } else if p < 0.01 {
        "**"
    } else if p < 0.05 {
        "*"
    } else {
        ""
    }
}

fn strength(r: f64) -> &'static str {
    match r.abs() {
        a if a >= 0.7 => "strong",
        a if a >= 0.4 => "moderate",
        a if a >= 0.1 => "weak",
        _ => "negligible",
    }
}

/// Alpha bands used in survey research
fn alpha_band(alpha: f64) -> &'static str {
    match alpha {
        a if a >= 0.9 => "Excellent",
        a if a >= 0.8 => "Good",
        a if a >= 0.7 => "Acceptable",
        a if a >= 0.6 => "Questionable",
        a if a >= 0.5 => "Poor",
        _ => "Unacceptable",
    }
}

/// Sturges' rule
fn histogram_bins(n: usize) -> usize {
    ((n.max(1) as f64).log2().ceil() as usize + 1).max(1)
}

/// Distinct present values; numeric columns in ascending order, text alphabetically
fn sorted_levels(column: &Column) -> Vec<String> {
    let mut levels = column.unique_texts();
    if column.is_numeric() {
        let key = |s: &String| s.parse::<f64>().unwrap_or(f64::NAN);
        levels.sort_by(|a, b| key(a).total_cmp(&key(b)));
    } else {
        levels.sort();
    }
    levels
}

fn table(columns: &[&str]) -> Table {
    Table::new(columns.iter().map(|c| c.to_string()).collect())
}

struct Summary {
    name: String,
    n: usize,
    mean: f64,
    std: Option<f64>,
    min: f64,
    max: f64,
}

pub struct Analyzer<'a> {
    data: &'a Frame,
    codebook: &'a Codebook,
    figure_title: Option<&'a str>,
}

impl<'a> Analyzer<'a> {
    pub fn new(data: &'a Frame, codebook: &'a Codebook) -> Self {
        Self {
            data,
            codebook,
            figure_title: None,
        }
    }

    /// Use a custom chart title instead of each analysis' default
    pub fn with_figure_title(mut self, title: Option<&'a str>) -> Self {
        self.figure_title = title.filter(|t| !t.trim().is_empty());
        self
    }

    pub fn run(&self, request: &AnalysisRequest) -> Result<AnalysisResult> {
        use AnalysisRequest as R;
        match request {
            R::Descriptive { variable } => self.descriptive(variable),
            R::CategoricalDescriptive {
                variable,
                plot_type,
                bar_orientation,
                pie_style,
            } => self.categorical_descriptive(variable, *plot_type, *bar_orientation, *pie_style),
            R::OrdinalAnalysis { variable } => self.ordinal_analysis(variable),
            R::MultiDescriptive { variables } => self.multi_descriptive(variables),
            R::DescriptiveRanking { variables } => self.descriptive_ranking(variables),
            R::MultiCategoryDescriptive { variable } => self.multi_category_descriptive(variable),
            R::ComparativeMultiCategory { variable, group } => self.comparative_multi_category(variable, group),
            R::Correlation { var1, var2 } => self.correlation(var1, var2),
            R::BivariateCorrelation { x_vars, y_var } => self.bivariate_correlation(x_vars, y_var),
            R::CorrelationMatrix { row_vars, col_vars } => self.correlation_matrix(row_vars, col_vars),
            R::OneSampleTtest { variable, popmean } => self.one_sample_ttest(variable, *popmean),
            R::Ttest { continuous, group } => self.ttest(continuous, group),
            R::Anova {
                dependent,
                independent,
            } => self.anova(dependent, independent),
            R::Chi2 { var1, var2 } => self.chi2(var1, var2),
            R::CronbachAlpha { variables } => self.cronbach_alpha(variables),
            R::LinearRegression { x_vars, y_var } => self.linear_regression(x_vars, y_var),
            R::LikertDistribution { variables } => self.likert_distribution(variables),
            R::ComparisonPlot { .. } => Err(invalid(
                "Comparison plots are drawn from the source and simulated data.".to_string(),
            )),
        }
    }

    fn title(&self, default: String) -> String {
        self.figure_title.map(str::to_string).unwrap_or(default)
    }

    fn column(&self, name: &str) -> Result<&'a Column> {
        self.data
            .column(name)
            .ok_or_else(|| invalid(format!("Variable '{}' not found in the data.", name)))
    }

    /// Column that must be numeric; `what` starts the error message
    fn numeric(&self, name: &str, what: &str) -> Result<&'a Column> {
        let column = self.column(name)?;
        if !column.is_numeric() {
            return Err(invalid(format!("{} '{}' must be numeric.", what, name)));
        }
        Ok(column)
    }

    /// Codebook label of a value, or the value itself
    fn label(&self, column: &str, value: &str) -> String {
        self.codebook
            .get(column)
            .and_then(|entry| entry.value_map.get(value))
            .cloned()
            .unwrap_or_else(|| value.to_string())
    }

    fn require_some(&self, variables: &[String], message: &str) -> Result<()> {
        if variables.is_empty() {
            return Err(invalid(message.to_string()));
        }
        Ok(())
    }

    /// Labelled frequencies, most frequent first (ties keep first appearance)
    fn frequencies(&self, column: &Column) -> Vec<(String, usize)> {
        let mut order: Vec<(String, usize)> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for text in column.values.iter().filter_map(|c| c.as_text()) {
            let label = self.label(&column.name, &text);
            match index.get(&label) {
                Some(&i) => order[i].1 += 1,
                None => {
                    index.insert(label.clone(), order.len());
                    order.push((label, 1));
                }
            }
        }
        order.sort_by(|a, b| b.1.cmp(&a.1));
        order
    }

    fn summaries(&self, variables: &[String]) -> Result<Vec<Summary>> {
        variables
            .iter()
            .map(|name| {
                let values = self.numeric(name, "Variable")?.numeric_values();
                Ok(Summary {
                    name: name.clone(),
                    n: values.len(),
                    mean: stats::mean(&values).unwrap_or(f64::NAN),
                    std: stats::std_dev(&values),
                    min: stats::min(&values).unwrap_or(f64::NAN),
                    max: stats::max(&values).unwrap_or(f64::NAN),
                })
            })
            .collect()
    }

    /// Numeric values of `value` split by the levels of `group`, empty groups dropped
    fn groups_of(&self, value: &Column, group: &Column) -> Vec<(String, Vec<f64>)> {
        let levels = sorted_levels(group);
        let index: HashMap<&str, usize> = levels.iter().enumerate().map(|(i, l)| (l.as_str(), i)).collect();
        let mut groups: Vec<(String, Vec<f64>)> = levels
            .iter()
            .map(|l| (self.label(&group.name, l), Vec::new()))
            .collect();
        for (v, g) in value.values.iter().zip(&group.values) {
            if let (Some(v), Some(g)) = (v.as_f64(), g.as_text()) {
                if let Some(&i) = index.get(g.as_str()) {
                    groups[i].1.push(v);
                }
            }
        }
        groups.retain(|(_, values)| !values.is_empty());
        groups
    }

    fn group_table(groups: &[(String, Vec<f64>)]) -> Table {
        let mut t = table(&["Group", "N", "Mean", "Std. Dev."]);
        for (name, values) in groups {
            t.push_row(vec![
                name.clone(),
                values.len().to_string(),
                fixed_or_na(stats::mean(values), 2),
                fixed_or_na(stats::std_dev(values), 2),
            ]);
        }
        t
    }

    /// Multi-select dummy columns `<key>_*` with their category labels
    fn dummy_columns(&self, key: &str) -> Result<Vec<(&'a Column, String)>> {
        let prefix = format!("{}_", key);
        let dummies: Vec<(&'a Column, String)> = self
            .data
            .columns()
            .iter()
            .filter(|c| c.name.starts_with(&prefix) && c.is_numeric())
            .map(|c| {
                let label = self
                    .codebook
                    .get(&c.name)
                    .and_then(|e| e.question_text.rsplit_once("(Category: "))
                    .and_then(|(_, rest)| rest.strip_suffix(')'))
                    .map(str::to_string)
                    .unwrap_or_else(|| c.name[prefix.len()..].to_string());
                (c, label)
            })
            .collect();
        if dummies.is_empty() {
            return Err(invalid(format!(
                "No multi-select columns found for '{}'. Encode it with a multi-select definition first.",
                key
            )));
        }
        Ok(dummies)
    }

    fn descriptive(&self, variable: &str) -> Result<AnalysisResult> {
        let values = self.numeric(variable, "Descriptive analysis variable")?.numeric_values();
        let mut t = table(&["Statistic", "Value"]);
        t.push_row(vec!["count".to_string(), values.len().to_string()]);
        let rows = [
            ("mean", stats::mean(&values)),
            ("std", stats::std_dev(&values)),
            ("min", stats::min(&values)),
            ("25%", stats::quantile(&values, 0.25)),
            ("50%", stats::median(&values)),
            ("75%", stats::quantile(&values, 0.75)),
            ("max", stats::max(&values)),
        ];
        for (name, value) in rows {
            t.push_row(vec![name.to_string(), fixed_or_na(value, 2)]);
        }

        let svg = charts::histogram(
            &values,
            histogram_bins(values.len()),
            &self.title(format!("Distribution of {}", variable)),
            variable,
        );
        let interpretation = format!(
            "'{}' has {} valid observations with a mean of {} (SD = {}), ranging from {} to {}. \
             The histogram shows the shape of its distribution.",
            variable,
            values.len(),
            fixed_or_na(stats::mean(&values), 2),
            fixed_or_na(stats::std_dev(&values), 2),
            fixed_or_na(stats::min(&values), 2),
            fixed_or_na(stats::max(&values), 2),
        );
        Ok(AnalysisResult::new(format!("Descriptive Statistics: {}", variable), t, interpretation).with_plot(&svg))
    }

    fn categorical_descriptive(
        &self,
        variable: &str,
        plot_type: PlotType,
        orientation: BarOrientation,
        pie_style: PieStyle,
    ) -> Result<AnalysisResult> {
        let column = self.column(variable)?;
        let freq = self.frequencies(column);
        if freq.is_empty() {
            return Err(invalid(format!("Variable '{}' has no values to count.", variable)));
        }
        let total: usize = freq.iter().map(|(_, n)| n).sum();

        let mut t = table(&["Category", "Frequency", "Percentage"]);
        for (label, n) in &freq {
            t.push_row(vec![label.clone(), n.to_string(), fixed(percent(*n, total), 2)]);
        }

        let labels: Vec<String> = freq.iter().map(|(l, _)| l.clone()).collect();
        let counts: Vec<f64> = freq.iter().map(|(_, n)| *n as f64).collect();
        let title = self.title(format!("Frequency of {}", variable));
        let svg = match (plot_type, orientation) {
            (PlotType::Pie, _) => charts::pie_chart(&labels, &counts, pie_style == PieStyle::Donut, &title),
            (PlotType::Bar, BarOrientation::Horizontal) => {
                charts::bar_chart(&labels, &counts, Orientation::Horizontal, &title, "Frequency", variable)
            }
            (PlotType::Bar, BarOrientation::Vertical) => {
                charts::bar_chart(&labels, &counts, Orientation::Vertical, &title, variable, "Frequency")
            }
        };

        let (top, top_n) = &freq[0];
        let interpretation = format!(
            "The table and chart show the frequency of each category of '{}'. \
             The most common category is '{}' with {} of {} responses ({:.2}%).",
            variable,
            top,
            top_n,
            total,
            percent(*top_n, total)
        );
        Ok(AnalysisResult::new(format!("Frequency Analysis: {}", variable), t, interpretation).with_plot(&svg))
    }

    fn ordinal_analysis(&self, variable: &str) -> Result<AnalysisResult> {
        let column = self.column(variable)?;
        let levels = sorted_levels(column);
        if levels.is_empty() {
            return Err(invalid(format!("Variable '{}' has no values to count.", variable)));
        }
        let mut counts: HashMap<String, usize> = HashMap::new();
        for text in column.values.iter().filter_map(|c| c.as_text()) {
            *counts.entry(text).or_insert(0) += 1;
        }
        let total: usize = counts.values().sum();

        let mut t = table(&["Category", "Frequency", "Percent", "Cumulative Percent"]);
        let mut cumulative = 0;
        let mut labels = Vec::with_capacity(levels.len());
        let mut values = Vec::with_capacity(levels.len());
        let mut mode: Option<(&str, usize)> = None;
        for level in &levels {
            let n = counts.get(level).copied().unwrap_or(0);
            cumulative += n;
            let label = self.label(variable, level);
            t.push_row(vec![
                label.clone(),
                n.to_string(),
                fixed(percent(n, total), 2),
                fixed(percent(cumulative, total), 2),
            ]);
            if mode.map_or(true, |(_, best)| n > best) {
                mode = Some((level.as_str(), n));
            }
            labels.push(label);
            values.push(n as f64);
        }

        let mode_label = mode.map(|(level, _)| self.label(variable, level)).unwrap_or_default();
        let median_label = if column.is_numeric() {
            stats::median(&column.numeric_values())
                .map(|m| {
                    let text = format_number(m);
                    if levels.contains(&text) {
                        self.label(variable, &text)
                    } else {
                        fixed(m, 2)
                    }
                })
                .unwrap_or_else(|| "N/A".to_string())
        } else {
            "N/A".to_string()
        };
        let mut summary = table(&["Statistic", "Value"]);
        summary.push_row(vec!["Median".to_string(), median_label.clone()]);
        summary.push_row(vec!["Mode".to_string(), mode_label.clone()]);

        let svg = charts::bar_chart(
            &labels,
            &values,
            Orientation::Vertical,
            &self.title(format!("Distribution of {}", variable)),
            variable,
            "Frequency",
        );
        let interpretation = format!(
            "Categories of '{}' are listed in their natural order with cumulative percentages. \
             The median response is {} and the most frequent response is '{}'.",
            variable, median_label, mode_label
        );
        Ok(AnalysisResult::new(format!("Ordinal Analysis: {}", variable), t, interpretation)
            .with_extra("Central Tendency", summary)
            .with_plot(&svg))
    }

    fn multi_descriptive(&self, variables: &[String]) -> Result<AnalysisResult> {
        self.require_some(variables, "Select at least one variable.")?;
        let summaries = self.summaries(variables)?;

        let mut t = table(&["Variable", "N", "Mean", "Std. Dev.", "Min", "Max"]);
        for s in &summaries {
            t.push_row(vec![
                s.name.clone(),
                s.n.to_string(),
                fixed(s.mean, 2),
                fixed_or_na(s.std, 2),
                fixed(s.min, 2),
                fixed(s.max, 2),
            ]);
        }
        let names: Vec<String> = summaries.iter().map(|s| s.name.clone()).collect();
        let means: Vec<f64> = summaries.iter().map(|s| s.mean).collect();
        let svg = charts::bar_chart(
            &names,
            &means,
            Orientation::Vertical,
            &self.title("Mean of Selected Variables".to_string()),
            "Variable",
            "Mean",
        );
        Ok(AnalysisResult::new(
            "Descriptive Statistics for Multiple Variables",
            t,
            "The table summarizes N, mean, standard deviation, minimum and maximum of each selected \
             variable, giving an overview of central tendency and dispersion.",
        )
        .with_plot(&svg))
    }

    fn descriptive_ranking(&self, variables: &[String]) -> Result<AnalysisResult> {
        self.require_some(variables, "Select at least one variable.")?;
        let mut summaries = self.summaries(variables)?;
        summaries.sort_by(|a, b| b.mean.total_cmp(&a.mean));

        let mut t = table(&["Rank", "Variable", "Mean", "Std. Dev.", "N"]);
        for (i, s) in summaries.iter().enumerate() {
            t.push_row(vec![
                (i + 1).to_string(),
                s.name.clone(),
                fixed(s.mean, 2),
                fixed_or_na(s.std, 2),
                s.n.to_string(),
            ]);
        }
        let names: Vec<String> = summaries.iter().map(|s| s.name.clone()).collect();
        let means: Vec<f64> = summaries.iter().map(|s| s.mean).collect();
        let svg = charts::bar_chart(
            &names,
            &means,
            Orientation::Horizontal,
            &self.title("Variables Ranked by Mean".to_string()),
            "Mean",
            "Variable",
        );
        let top = &summaries[0];
        let bottom = &summaries[summaries.len() - 1];
        let interpretation = format!(
            "'{}' ranks highest with a mean of {:.2}; '{}' ranks lowest with a mean of {:.2}.",
            top.name, top.mean, bottom.name, bottom.mean
        );
        Ok(AnalysisResult::new("Descriptive Ranking", t, interpretation).with_plot(&svg))
    }

    fn multi_category_descriptive(&self, variable: &str) -> Result<AnalysisResult> {
        let dummies = self.dummy_columns(variable)?;
        let respondents = self.data.n_rows();
        let mut counts: Vec<(String, usize)> = dummies
            .iter()
            .map(|(c, label)| {
                let n = c.values.iter().filter(|v| v.as_f64() == Some(1.0)).count();
                (label.clone(), n)
            })
            .collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1));

        let mut t = table(&["Category", "Count", "Percentage of Respondents"]);
        for (label, n) in &counts {
            t.push_row(vec![label.clone(), n.to_string(), fixed(percent(*n, respondents), 2)]);
        }
        let labels: Vec<String> = counts.iter().map(|(l, _)| l.clone()).collect();
        let values: Vec<f64> = counts.iter().map(|(_, n)| *n as f64).collect();
        let svg = charts::bar_chart(
            &labels,
            &values,
            Orientation::Horizontal,
            &self.title(format!("Selections for {}", variable)),
            "Count",
            "Category",
        );
        let (top, top_n) = &counts[0];
        let interpretation = format!(
            "Respondents could choose several options for '{}', so percentages may sum to more than 100%. \
             The most selected option is '{}' ({} of {} respondents, {:.2}%).",
            variable,
            top,
            top_n,
            respondents,
            percent(*top_n, respondents)
        );
        Ok(AnalysisResult::new(format!("Multi-Select Analysis: {}", variable), t, interpretation).with_plot(&svg))
    }

    fn comparative_multi_category(&self, variable: &str, group: &str) -> Result<AnalysisResult> {
        let dummies = self.dummy_columns(variable)?;
        let group_col = self.column(group)?;
        let levels = sorted_levels(group_col);
        if levels.is_empty() {
            return Err(invalid(format!("Grouping variable '{}' has no values.", group)));
        }
        let index: HashMap<&str, usize> = levels.iter().enumerate().map(|(i, l)| (l.as_str(), i)).collect();

        let mut counts = vec![vec![0usize; levels.len()]; dummies.len()];
        for (row, cell) in group_col.values.iter().enumerate() {
            let Some(&g) = cell.as_text().as_deref().and_then(|t| index.get(t)) else {
                continue;
            };
            for (d, (column, _)) in dummies.iter().enumerate() {
                if column.values.get(row).and_then(|v| v.as_f64()) == Some(1.0) {
                    counts[d][g] += 1;
                }
            }
        }

        let group_labels: Vec<String> = levels.iter().map(|l| self.label(group, l)).collect();
        let categories: Vec<String> = dummies.iter().map(|(_, l)| l.clone()).collect();
        let mut columns = vec!["Category".to_string()];
        columns.extend(group_labels.iter().cloned());
        let mut t = Table::new(columns);
        for (label, row) in categories.iter().zip(&counts) {
            let mut cells = vec![label.clone()];
            cells.extend(row.iter().map(|n| n.to_string()));
            t.push_row(cells);
        }

        let values: Vec<Vec<f64>> = counts.iter().map(|r| r.iter().map(|n| *n as f64).collect()).collect();
        let annotations: Vec<Vec<String>> = counts.iter().map(|r| r.iter().map(|n| n.to_string()).collect()).collect();
        let svg = charts::heatmap(
            &categories,
            &group_labels,
            &values,
            &annotations,
            &self.title(format!("{} by {}", variable, group)),
        );

        let notes: Vec<String> = group_labels
            .iter()
            .enumerate()
            .filter_map(|(g, label)| {
                let (d, n) = counts.iter().enumerate().map(|(d, r)| (d, r[g])).max_by_key(|(_, n)| *n)?;
                (n > 0).then(|| format!("In '{}', the most selected option is '{}' ({}).", label, categories[d], n))
            })
            .collect();
        let interpretation = format!(
            "The table counts selections of each option of '{}' within each group of '{}'. {}",
            variable,
            group,
            notes.join(" ")
        );
        Ok(AnalysisResult::new(format!("Multi-Select Comparison: {} by {}", variable, group), t, interpretation.trim_end().to_string())
            .with_plot(&svg))
    }

    fn correlation(&self, var1: &str, var2: &str) -> Result<AnalysisResult> {
        let x = self.numeric(var1, "Correlation variable")?.as_f64_vec();
        let y = self.numeric(var2, "Correlation variable")?.as_f64_vec();
        let (xs, ys) = stats::pairwise_complete(&x, &y);
        let corr = stats::pearson(&xs, &ys).ok_or_else(|| {
            invalid(format!(
                "Correlation between '{}' and '{}' needs at least three complete pairs of non-constant values.",
                var1, var2
            ))
        })?;

        let mut t = table(&["Pearson r", "p-value", "N"]);
        t.push_row(vec![fixed(corr.r, 3), fixed(corr.p, 4), corr.n.to_string()]);

        let fit = match (stats::std_dev(&xs), stats::std_dev(&ys), stats::mean(&xs), stats::mean(&ys)) {
            (Some(sx), Some(sy), Some(mx), Some(my)) => {
                let slope = corr.r * sy / sx;
                Some((my - slope * mx, slope))
            }
            _ => None,
        };
        let svg = charts::scatter(
            &xs,
            &ys,
            fit,
            &self.title(format!("Scatter Plot of {} vs. {}", var1, var2)),
            var1,
            var2,
        );
        let direction = if corr.r >= 0.0 { "positive" } else { "negative" };
        let interpretation = format!(
            "A Pearson correlation was run between '{}' and '{}'. The coefficient r = {:.3} (p = {:.4}) \
             indicates a {} {} linear relationship, which is {}statistically significant at the 0.05 level. \
             Correlation does not imply causation.",
            var1,
            var2,
            corr.r,
            corr.p,
            strength(corr.r),
            direction,
            if corr.p < 0.05 { "" } else { "not " }
        );
        Ok(AnalysisResult::new(format!("Correlation: {} vs. {}", var1, var2), t, interpretation).with_plot(&svg))
    }

    fn bivariate_correlation(&self, x_vars: &[String], y_var: &str) -> Result<AnalysisResult> {
        self.require_some(x_vars, "Select at least one variable to correlate.")?;
        let y = self.numeric(y_var, "Correlation variable")?.as_f64_vec();

        let mut t = table(&["Variable", "Pearson r", "p-value", "N"]);
        let mut rs = Vec::with_capacity(x_vars.len());
        let mut annotations = Vec::with_capacity(x_vars.len());
        let mut significant = Vec::new();
        for name in x_vars {
            let x = self.numeric(name, "Correlation variable")?.as_f64_vec();
            let (xs, ys) = stats::pairwise_complete(&x, &y);
            match stats::pearson(&xs, &ys) {
                Some(c) => {
                    t.push_row(vec![name.clone(), fixed(c.r, 3), fixed(c.p, 4), c.n.to_string()]);
                    rs.push(vec![c.r]);
                    annotations.push(vec![format!("{:.2}{}", c.r, stars(c.p))]);
                    if c.p < 0.05 {
                        significant.push(name.clone());
                    }
                }
                None => {
                    t.push_row(vec![name.clone(), "N/A".into(), "N/A".into(), xs.len().to_string()]);
                    rs.push(vec![f64::NAN]);
                    annotations.push(vec!["N/A".to_string()]);
                }
            }
        }

        let svg = charts::heatmap(
            x_vars,
            &[y_var.to_string()],
            &rs,
            &annotations,
            &self.title(format!("Correlations with {}", y_var)),
        );
        let interpretation = if significant.is_empty() {
            format!("None of the selected variables correlates significantly with '{}' (p < 0.05).", y_var)
        } else {
            format!(
                "{} of {} variables correlate significantly with '{}' (p < 0.05): {}.",
                significant.len(),
                x_vars.len(),
                y_var,
                significant.join(", ")
            )
        };
        Ok(AnalysisResult::new(format!("Bivariate Correlations with {}", y_var), t, interpretation).with_plot(&svg))
    }

    fn correlation_matrix(&self, row_vars: &[String], col_vars: &[String]) -> Result<AnalysisResult> {
        self.require_some(row_vars, "Select at least one row variable.")?;
        self.require_some(col_vars, "Select at least one column variable.")?;
        let rows = row_vars
            .iter()
            .map(|v| Ok(self.numeric(v, "Correlation variable")?.as_f64_vec()))
            .collect::<Result<Vec<_>>>()?;
        let cols = col_vars
            .iter()
            .map(|v| Ok(self.numeric(v, "Correlation variable")?.as_f64_vec()))
            .collect::<Result<Vec<_>>>()?;

        let mut columns = vec!["Variable".to_string()];
        columns.extend(col_vars.iter().cloned());
        let mut t = Table::new(columns);
        let mut values = Vec::with_capacity(rows.len());
        let mut annotations = Vec::with_capacity(rows.len());
        for (name, x) in row_vars.iter().zip(&rows) {
            let mut cells = vec![name.clone()];
            let mut r_row = Vec::with_capacity(cols.len());
            let mut a_row = Vec::with_capacity(cols.len());
            for y in &cols {
                let (xs, ys) = stats::pairwise_complete(x, y);
                match stats::pearson(&xs, &ys) {
                    Some(c) => {
                        cells.push(format!("{:.3}{}", c.r, stars(c.p)));
                        r_row.push(c.r);
                        a_row.push(format!("{:.2}{}", c.r, stars(c.p)));
                    }
                    None => {
                        cells.push("N/A".to_string());
                        r_row.push(f64::NAN);
                        a_row.push("N/A".to_string());
                    }
                }
            }
            t.push_row(cells);
            values.push(r_row);
            annotations.push(a_row);
        }

        let svg = charts::heatmap(
            row_vars,
            col_vars,
            &values,
            &annotations,
            &self.title("Correlation Matrix".to_string()),
        );
        Ok(AnalysisResult::new(
            "Correlation Matrix",
            t,
            "Each cell holds the Pearson r of a row and column variable using pairwise deletion. \
             Stars mark significance: * p < 0.05, ** p < 0.01, *** p < 0.001.",
        )
        .with_plot(&svg))
    }

    fn one_sample_ttest(&self, variable: &str, popmean: f64) -> Result<AnalysisResult> {
        let column = self.column(variable)?;
        if !column.is_numeric() {
            return Err(invalid(format!(
                "Variable '{}' must be numeric for a one-sample t-test.",
                variable
            )));
        }
        let values = column.numeric_values();
        let test = stats::one_sample_ttest(&values, popmean).ok_or_else(|| {
            invalid(format!(
                "A one-sample t-test on '{}' needs at least two values.",
                variable
            ))
        })?;

        let mut t = table(&["Statistic", "Value"]);
        t.push_row(vec!["N".to_string(), values.len().to_string()]);
        t.push_row(vec!["Sample Mean".to_string(), fixed_or_na(stats::mean(&values), 3)]);
        t.push_row(vec!["Test Value".to_string(), format_number(popmean)]);
        t.push_row(vec!["t-statistic".to_string(), fixed(test.t, 3)]);
        t.push_row(vec!["Degrees of Freedom".to_string(), format_number(test.df)]);
        t.push_row(vec!["p-value".to_string(), fixed(test.p, 4)]);

        let svg = charts::histogram(
            &values,
            histogram_bins(values.len()),
            &self.title(format!("Distribution of {}", variable)),
            variable,
        );
        let interpretation = format!(
            "A one-sample t-test compared the mean of '{}' with the test value {}. \
             The result, t = {:.2}, p = {:.4}, suggests that there {} a statistically significant \
             difference between the sample mean and {}.",
            variable,
            format_number(popmean),
            test.t,
            test.p,
            if test.p < 0.05 { "is" } else { "is not" },
            format_number(popmean)
        );
        Ok(AnalysisResult::new(format!("One-Sample T-Test: {}", variable), t, interpretation).with_plot(&svg))
    }

    fn ttest(&self, continuous: &str, group: &str) -> Result<AnalysisResult> {
        let value = self.numeric(continuous, "T-test continuous variable")?;
        let group_col = self.column(group)?;
        let groups = self.groups_of(value, group_col);
        if groups.len() != 2 {
            return Err(invalid(format!(
                "T-test requires exactly two groups, but found {} in '{}'.",
                groups.len(),
                group
            )));
        }
        let test = stats::independent_ttest(&groups[0].1, &groups[1].1)
            .ok_or_else(|| invalid("Each group needs at least two values for a t-test.".to_string()))?;

        let mut t = table(&["Statistic", "Value"]);
        t.push_row(vec!["t-statistic".to_string(), fixed(test.t, 3)]);
        t.push_row(vec!["Degrees of Freedom".to_string(), format_number(test.df)]);
        t.push_row(vec!["p-value".to_string(), fixed(test.p, 4)]);

        let svg = charts::boxplot(
            &groups,
            &self.title(format!("{} by {}", continuous, group)),
            group,
            continuous,
        );
        let interpretation = format!(
            "An independent samples t-test compared the means of '{}' for '{}' and '{}'. \
             The result is t = {:.2} with p = {:.4}. A p-value below 0.05 suggests a statistically \
             significant difference in means.",
            continuous, groups[0].0, groups[1].0, test.t, test.p
        );
        Ok(AnalysisResult::new(format!("Independent T-Test: {} by {}", continuous, group), t, interpretation)
            .with_extra("Group Statistics", Self::group_table(&groups))
            .with_plot(&svg))
    }

    fn anova(&self, dependent: &str, independent: &str) -> Result<AnalysisResult> {
        let value = self.numeric(dependent, "ANOVA dependent variable")?;
        let group_col = self.column(independent)?;
        let groups = self.groups_of(value, group_col);
        if groups.len() < 2 {
            return Err(invalid("ANOVA requires at least two groups with data.".to_string()));
        }
        let values: Vec<Vec<f64>> = groups.iter().map(|(_, v)| v.clone()).collect();
        let result = stats::one_way_anova(&values)
            .ok_or_else(|| invalid("ANOVA needs more observations than groups.".to_string()))?;

        let mut t = table(&["Statistic", "Value"]);
        t.push_row(vec!["F-statistic".to_string(), fixed(result.f, 3)]);
        t.push_row(vec!["df (between)".to_string(), format_number(result.df_between)]);
        t.push_row(vec!["df (within)".to_string(), format_number(result.df_within)]);
        t.push_row(vec!["p-value".to_string(), fixed(result.p, 4)]);

        let svg = charts::boxplot(
            &groups,
            &self.title(format!("{} by {}", dependent, independent)),
            independent,
            dependent,
        );
        let interpretation = format!(
            "A one-way ANOVA compared the means of '{}' across the groups of '{}'. \
             The F-statistic is {:.2} with a p-value of {:.4}. A p-value below 0.05 indicates a \
             statistically significant difference between group means.",
            dependent, independent, result.f, result.p
        );
        Ok(AnalysisResult::new(format!("ANOVA: {} by {}", dependent, independent), t, interpretation)
            .with_extra("Group Statistics", Self::group_table(&groups))
            .with_plot(&svg))
    }

    fn chi2(&self, var1: &str, var2: &str) -> Result<AnalysisResult> {
        let a = self.column(var1)?;
        let b = self.column(var2)?;
        let row_levels = sorted_levels(a);
        let col_levels = sorted_levels(b);
        let row_index: HashMap<&str, usize> = row_levels.iter().enumerate().map(|(i, l)| (l.as_str(), i)).collect();
        let col_index: HashMap<&str, usize> = col_levels.iter().enumerate().map(|(i, l)| (l.as_str(), i)).collect();

        let mut observed = vec![vec![0.0; col_levels.len()]; row_levels.len()];
        for (x, y) in a.values.iter().zip(&b.values) {
            if let (Some(x), Some(y)) = (x.as_text(), y.as_text()) {
                if let (Some(&i), Some(&j)) = (row_index.get(x.as_str()), col_index.get(y.as_str())) {
                    observed[i][j] += 1.0;
                }
            }
        }
        let result = stats::chi2_contingency(&observed).ok_or_else(|| {
            invalid(format!(
                "A chi-squared test needs at least two observed categories in both '{}' and '{}'.",
                var1, var2
            ))
        })?;

        let row_labels: Vec<String> = row_levels.iter().map(|l| self.label(var1, l)).collect();
        let col_labels: Vec<String> = col_levels.iter().map(|l| self.label(var2, l)).collect();
        let mut columns = vec![var1.to_string()];
        columns.extend(col_labels.iter().cloned());
        let mut contingency = Table::new(columns);
        for (label, row) in row_labels.iter().zip(&observed) {
            let mut cells = vec![label.clone()];
            cells.extend(row.iter().map(|n| format_number(*n)));
            contingency.push_row(cells);
        }

        let mut t = table(&["Statistic", "Value"]);
        t.push_row(vec!["Chi-Squared".to_string(), fixed(result.chi2, 3)]);
        t.push_row(vec!["Degrees of Freedom".to_string(), result.dof.to_string()]);
        t.push_row(vec!["p-value".to_string(), fixed(result.p, 4)]);

        let annotations: Vec<Vec<String>> = observed
            .iter()
            .map(|r| r.iter().map(|n| format_number(*n)).collect())
            .collect();
        let svg = charts::heatmap(
            &row_labels,
            &col_labels,
            &observed,
            &annotations,
            &self.title(format!("Contingency Table: {} vs. {}", var1, var2)),
        );
        let interpretation = format!(
            "A chi-squared test of independence was performed between '{}' and '{}'. \
             It yielded a chi-squared value of {:.2} with {} degrees of freedom and a p-value of {:.4}. \
             A p-value below 0.05 suggests a statistically significant association between the variables.",
            var1, var2, result.chi2, result.dof, result.p
        );
        Ok(AnalysisResult::new(format!("Chi-Squared Test: {} vs. {}", var1, var2), t, interpretation)
            .with_extra("Contingency Table", contingency)
            .with_plot(&svg))
    }

    fn cronbach_alpha(&self, variables: &[String]) -> Result<AnalysisResult> {
        if variables.len() < 2 {
            return Err(invalid("Cronbach's alpha requires at least two items.".to_string()));
        }
        let items = variables
            .iter()
            .map(|v| Ok(self.numeric(v, "Scale item")?.as_f64_vec()))
            .collect::<Result<Vec<_>>>()?;
        let rows = stats::listwise_complete(&items);
        if rows.len() < 2 {
            return Err(invalid(
                "Not enough complete responses to compute Cronbach's alpha.".to_string(),
            ));
        }
        let alpha = stats::cronbach_alpha(&rows).ok_or_else(|| {
            invalid("Cronbach's alpha is undefined because the total scores do not vary.".to_string())
        })?;

        let mut t = table(&["Statistic", "Value"]);
        t.push_row(vec!["Cronbach's Alpha".to_string(), fixed(alpha, 3)]);
        t.push_row(vec!["Number of Items".to_string(), variables.len().to_string()]);
        t.push_row(vec!["Complete Cases".to_string(), rows.len().to_string()]);
        t.push_row(vec!["Internal Consistency".to_string(), alpha_band(alpha).to_string()]);

        let mut item_table = table(&["Item", "Mean", "Corrected Item-Total Correlation", "Alpha if Item Deleted"]);
        for (j, name) in variables.iter().enumerate() {
            let item: Vec<f64> = rows.iter().map(|r| r[j]).collect();
            let rest: Vec<f64> = rows.iter().map(|r| r.iter().sum::<f64>() - r[j]).collect();
            let item_total = stats::pearson(&item, &rest).map(|c| c.r);
            let without: Vec<Vec<f64>> = rows
                .iter()
                .map(|r| r.iter().enumerate().filter(|(i, _)| *i != j).map(|(_, v)| *v).collect())
                .collect();
            let if_deleted = if variables.len() > 2 {
                stats::cronbach_alpha(&without)
            } else {
                None
            };
            item_table.push_row(vec![
                name.clone(),
                fixed_or_na(stats::mean(&item), 2),
                fixed_or_na(item_total, 3),
                fixed_or_na(if_deleted, 3),
            ]);
        }

        let interpretation = format!(
            "Cronbach's alpha for the {} items is {:.3}, which indicates {} internal consistency \
             ({} complete cases). Items whose removal would raise alpha may not measure the same construct.",
            variables.len(),
            alpha,
            alpha_band(alpha).to_lowercase(),
            rows.len()
        );
        Ok(AnalysisResult::new("Reliability Analysis (Cronbach's Alpha)", t, interpretation)
            .with_extra("Item Statistics", item_table))
    }

    fn linear_regression(&self, x_vars: &[String], y_var: &str) -> Result<AnalysisResult> {
        self.require_some(x_vars, "Select at least one predictor.")?;
        if x_vars.iter().any(|x| x == y_var) {
            return Err(invalid(format!(
                "'{}' cannot be both the outcome and a predictor.",
                y_var
            )));
        }
        let mut columns = vec![self.numeric(y_var, "Regression outcome variable")?.as_f64_vec()];
        for x in x_vars {
            columns.push(self.numeric(x, "Regression predictor")?.as_f64_vec());
        }
        let rows = stats::listwise_complete(&columns);
        let y: Vec<f64> = rows.iter().map(|r| r[0]).collect();
        let predictors: Vec<Vec<f64>> = rows.iter().map(|r| r[1..].to_vec()).collect();
        let fit = stats::ols(&predictors, &y)?;

        let mut t = table(&["Variable", "Coefficient", "Std. Error", "t", "p-value"]);
        let names = std::iter::once("const".to_string()).chain(x_vars.iter().cloned());
        for (i, name) in names.enumerate() {
            t.push_row(vec![
                name,
                fixed(fit.coefficients[i], 4),
                fixed(fit.std_errors[i], 4),
                fixed(fit.t_values[i], 3),
                fixed(fit.p_values[i], 4),
            ]);
        }
        let mut model = table(&["Statistic", "Value"]);
        model.push_row(vec!["R-squared".to_string(), fixed(fit.r_squared, 3)]);
        model.push_row(vec!["Adj. R-squared".to_string(), fixed(fit.adj_r_squared, 3)]);
        model.push_row(vec!["F-statistic".to_string(), fixed(fit.f_statistic, 3)]);
        model.push_row(vec!["Prob (F-statistic)".to_string(), fixed(fit.f_p_value, 4)]);
        model.push_row(vec!["Observations".to_string(), fit.n.to_string()]);

        let svg = if x_vars.len() == 1 {
            let x: Vec<f64> = predictors.iter().map(|r| r[0]).collect();
            charts::scatter(
                &x,
                &y,
                Some((fit.coefficients[0], fit.coefficients[1])),
                &self.title(format!("{} vs. {}", y_var, x_vars[0])),
                &x_vars[0],
                y_var,
            )
        } else {
            let fitted: Vec<f64> = predictors
                .iter()
                .map(|r| fit.coefficients[0] + r.iter().zip(&fit.coefficients[1..]).map(|(x, b)| x * b).sum::<f64>())
                .collect();
            charts::scatter(
                &fitted,
                &y,
                Some((0.0, 1.0)),
                &self.title(format!("Actual vs. Predicted {}", y_var)),
                "Predicted",
                y_var,
            )
        };

        let significant: Vec<&str> = x_vars
            .iter()
            .zip(&fit.p_values[1..])
            .filter(|(_, p)| **p < 0.05)
            .map(|(n, _)| n.as_str())
            .collect();
        let predictors_note = if significant.is_empty() {
            "No predictor is significant at p < 0.05.".to_string()
        } else {
            format!("Significant predictors at p < 0.05: {}.", significant.join(", "))
        };
        let interpretation = format!(
            "The model explains {:.1}% of the variance in '{}' (R² = {:.3}, adjusted R² = {:.3}; \
             F = {:.2}, p = {:.4}; N = {}). {}",
            fit.r_squared * 100.0,
            y_var,
            fit.r_squared,
            fit.adj_r_squared,
            fit.f_statistic,
            fit.f_p_value,
            fit.n,
            predictors_note
        );
        Ok(AnalysisResult::new(format!("Linear Regression: {}", y_var), t, interpretation)
            .with_extra("Model Summary", model)
            .with_plot(&svg))
    }

    fn likert_distribution(&self, variables: &[String]) -> Result<AnalysisResult> {
        self.require_some(variables, "Select at least one Likert item.")?;
        let items = variables
            .iter()
            .map(|v| self.numeric(v, "Likert item"))
            .collect::<Result<Vec<_>>>()?;

        let mut codes: Vec<f64> = items.iter().flat_map(|c| c.numeric_values()).collect();
        codes.sort_by(f64::total_cmp);
        codes.dedup();
        let code_texts: Vec<String> = codes.iter().map(|c| format_number(*c)).collect();
        let categories: Vec<String> = code_texts
            .iter()
            .map(|code| {
                variables
                    .iter()
                    .find_map(|v| self.codebook.get(v).and_then(|e| e.value_map.get(code)).cloned())
                    .unwrap_or_else(|| code.clone())
            })
            .collect();

        let mut columns = vec!["Item".to_string()];
        columns.extend(categories.iter().cloned());
        let mut t = Table::new(columns);
        let mut percents = Vec::with_capacity(items.len());
        let mut means = Vec::with_capacity(items.len());
        for (name, column) in variables.iter().zip(&items) {
            let values = column.numeric_values();
            let row: Vec<f64> = codes
                .iter()
                .map(|code| percent(values.iter().filter(|v| *v == code).count(), values.len()))
                .collect();
            let mut cells = vec![name.clone()];
            cells.extend(row.iter().map(|p| format!("{:.1}%", p)));
            t.push_row(cells);
            percents.push(row);
            means.push((name, stats::mean(&values).unwrap_or(f64::NAN)));
        }

        let svg = charts::stacked_percent_bars(
            variables,
            &categories,
            &percents,
            &self.title("Likert Response Distribution".to_string()),
        );
        let mut interpretation = format!(
            "Each bar shows how responses to an item are spread across the {} response categories.",
            categories.len()
        );
        if let Some((name, mean)) = means.iter().max_by(|a, b| a.1.total_cmp(&b.1)) {
            interpretation.push_str(&format!(" '{}' has the highest mean response ({:.2}).", name, mean));
        }
        Ok(AnalysisResult::new("Likert Item Distribution", t, interpretation).with_plot(&svg))
    }
}

/// Original vs simulated distribution of one key, with per-dataset descriptives
pub fn comparison_plot(
    original: &Frame,
    simulated: &Frame,
    key: &str,
    question: &str,
    figure_title: Option<&str>,
) -> Result<AnalysisResult> {
    fn find<'f>(frame: &'f Frame, key: &str, which: &str) -> Result<&'f Column> {
        frame
            .column(key)
            .ok_or_else(|| invalid(format!("Variable '{}' not found in the {} data.", key, which)))
    }
    let a = find(original, key, "original")?;
    let b = find(simulated, key, "simulated")?;
    if !a.is_numeric() || !b.is_numeric() {
        return Err(invalid(format!(
            "Comparison plots require a numeric variable; '{}' is not numeric.",
            key
        )));
    }
    let series = [
        ("Original".to_string(), a.numeric_values()),
        ("Simulated".to_string(), b.numeric_values()),
    ];

    let mut t = table(&["Dataset", "N", "Mean", "Std. Dev.", "Min", "Max"]);
    for (name, values) in &series {
        t.push_row(vec![
            name.clone(),
            values.len().to_string(),
            fixed_or_na(stats::mean(values), 2),
            fixed_or_na(stats::std_dev(values), 2),
            fixed_or_na(stats::min(values), 2),
            fixed_or_na(stats::max(values), 2),
        ]);
    }
    let title = figure_title
        .filter(|t| !t.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Distribution Comparison: {}", question));
    let svg = charts::kde_comparison(&series, &title, key);

    let interpretation = match (stats::mean(&series[0].1), stats::mean(&series[1].1)) {
        (Some(m0), Some(m1)) => format!(
            "The simulated mean of '{}' is {:.2} against an original mean of {:.2} (difference {:+.2}). \
             Overlapping curves indicate the simulation preserved the distribution.",
            key,
            m1,
            m0,
            m1 - m0
        ),
        _ => format!("Distribution of '{}' in the original and simulated data.", key),
    };
    Ok(AnalysisResult::new(format!("Original vs. Simulated: {}", key), t, interpretation).with_plot(&svg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::CodebookEntry;
    use txdata_common::{Cell, OrderedMap};

    fn frame() -> Frame {
        let nums = |name: &str, v: &[f64]| Column::from_numbers(name, &v.iter().map(|x| Some(*x)).collect::<Vec<_>>());
        Frame::from_columns(vec![
            nums("q1", &[1.0, 2.0, 3.0, 4.0, 5.0, 4.0, 3.0, 5.0]),
            nums("q2", &[2.0, 3.0, 3.0, 5.0, 5.0, 4.0, 4.0, 5.0]),
            nums("q3", &[1.0, 1.0, 2.0, 2.0, 1.0, 2.0, 1.0, 2.0]),
            Column::new(
                "q4",
                ["a", "b", "a", "c", "a", "b", "a", "c"].iter().map(|s| Cell::Text(s.to_string())).collect(),
            ),
            nums("q5_red", &[1.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 1.0]),
            nums("q5_blue", &[0.0, 1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0]),
        ])
        .unwrap()
    }

    fn codebook() -> Codebook {
        let mut book = Codebook::new();
        let mut map = OrderedMap::new();
        map.insert("1", "Male".to_string());
        map.insert("2", "Female".to_string());
        book.insert(
            "q3",
            CodebookEntry {
                question_text: "Gender".to_string(),
                encoder_type: "Nominal".to_string(),
                value_map: map,
            },
        );
        book.insert(
            "q5_red",
            CodebookEntry {
                question_text: "Colours (Category: Red)".to_string(),
                encoder_type: "Binary (from Multi-Select)".to_string(),
                value_map: OrderedMap::new(),
            },
        );
        book
    }

    fn run(request: AnalysisRequest) -> Result<AnalysisResult> {
        let (data, book) = (frame(), codebook());
        Analyzer::new(&data, &book).run(&request)
    }

    #[test]
    fn test_descriptive_table_and_plot() {
        let result = run(AnalysisRequest::Descriptive { variable: "q1".into() }).unwrap();
        assert_eq!(result.stats_table.rows[0], vec!["count", "8"]);
        assert_eq!(result.stats_table.rows[1][0], "mean");
        let mean: f64 = result.stats_table.rows[1][1].parse().unwrap();
        assert!((mean - 3.375).abs() < 0.01);
        assert!(result.plot.unwrap().starts_with("data:image/svg+xml;base64,"));
        assert!(result.stats_table_html.starts_with("<table"));
    }

    #[test]
    fn test_type_check_messages() {
        let err = run(AnalysisRequest::Anova {
            dependent: "q4".into(),
            independent: "q3".into(),
        })
        .unwrap_err();
        assert_eq!(err.to_string(), "Invalid input: ANOVA dependent variable 'q4' must be numeric.");

        let err = run(AnalysisRequest::Descriptive { variable: "nope".into() }).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_categorical_uses_codebook_labels() {
        let result = run(AnalysisRequest::CategoricalDescriptive {
            variable: "q3".into(),
            plot_type: PlotType::Pie,
            bar_orientation: BarOrientation::Horizontal,
            pie_style: PieStyle::Donut,
        })
        .unwrap();
        let labels: Vec<&str> = result.stats_table.rows.iter().map(|r| r[0].as_str()).collect();
        assert_eq!(labels, vec!["Male", "Female"]);
        assert_eq!(result.stats_table.rows[0][2], "50.00");
    }

    #[test]
    fn test_ttest_requires_two_groups() {
        let err = run(AnalysisRequest::Ttest {
            continuous: "q1".into(),
            group: "q4".into(),
        })
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid input: T-test requires exactly two groups, but found 3 in 'q4'."
        );

        let result = run(AnalysisRequest::Ttest {
            continuous: "q1".into(),
            group: "q3".into(),
        })
        .unwrap();
        assert_eq!(result.extra_tables[0].table.rows[0][0], "Male");
    }

    #[test]
    fn test_correlation_matrix_cells() {
        let result = run(AnalysisRequest::CorrelationMatrix {
            row_vars: vec!["q1".into()],
            col_vars: vec!["q1".into(), "q2".into()],
        })
        .unwrap();
        assert_eq!(result.stats_table.columns, vec!["Variable", "q1", "q2"]);
        assert_eq!(result.stats_table.rows[0][1], "1.000***");
    }

    #[test]
    fn test_multi_category_counts() {
        let result = run(AnalysisRequest::MultiCategoryDescriptive { variable: "q5".into() }).unwrap();
        assert_eq!(result.stats_table.rows[0], vec!["Red", "5", "62.50"]);
        assert_eq!(result.stats_table.rows[1], vec!["blue", "2", "25.00"]);

        let err = run(AnalysisRequest::MultiCategoryDescriptive { variable: "q9".into() }).unwrap_err();
        assert!(err.to_string().contains("No multi-select columns found for 'q9'"));
    }

    #[test]
    fn test_cronbach_alpha_needs_two_items() {
        let err = run(AnalysisRequest::CronbachAlpha {
            variables: vec!["q1".into()],
        })
        .unwrap_err();
        assert!(err.to_string().contains("at least two items"));

        let result = run(AnalysisRequest::CronbachAlpha {
            variables: vec!["q1".into(), "q2".into()],
        })
        .unwrap();
        assert_eq!(result.stats_table.rows[1][1], "2");
        assert_eq!(result.extra_tables[0].table.rows[0][3], "N/A");
    }

    #[test]
    fn test_regression_reports_model_summary() {
        let result = run(AnalysisRequest::LinearRegression {
            x_vars: vec!["q1".into()],
            y_var: "q2".into(),
        })
        .unwrap();
        assert_eq!(result.stats_table.rows[0][0], "const");
        assert_eq!(result.extra_tables[0].title, "Model Summary");
        assert_eq!(result.extra_tables[0].table.rows[4][1], "8");
    }

    #[test]
    fn test_chi2_contingency_extra_table() {
        let result = run(AnalysisRequest::Chi2 {
            var1: "q3".into(),
            var2: "q4".into(),
        })
        .unwrap();
        let contingency = &result.extra_tables[0].table;
        assert_eq!(contingency.columns, vec!["q3", "a", "b", "c"]);
        assert_eq!(contingency.rows[0], vec!["Male", "3", "1", "0"]);
    }

    #[test]
    fn test_figure_title_overrides_default() {
        let (data, book) = (frame(), codebook());
        let result = Analyzer::new(&data, &book)
            .with_figure_title(Some("My Chart"))
            .run(&AnalysisRequest::Descriptive { variable: "q1".into() })
            .unwrap();
        let uri = result.plot.unwrap();
        let encoded = uri.trim_start_matches("data:image/svg+xml;base64,");
        use base64::Engine as _;
        let svg = String::from_utf8(base64::engine::general_purpose::STANDARD.decode(encoded).unwrap()).unwrap();
        assert!(svg.contains("My Chart"));
    }

    #[test]
    fn test_comparison_plot_descriptives() {
        let data = frame();
        let result = comparison_plot(&data, &data, "q1", "Age", None).unwrap();
        assert_eq!(result.stats_table.rows.len(), 2);
        assert_eq!(result.stats_table.rows[0][0], "Original");

        let err = comparison_plot(&data, &data, "q4", "Colour", None).unwrap_err();
        assert!(err.to_string().contains("must be numeric") || err.to_string().contains("not numeric"));
    }

    #[test]
    fn test_comparison_plot_names_the_dataset_missing_the_variable() {
        let data = frame();
        let simulated = data.select(&["q2".to_string()]).unwrap();
        let err = comparison_plot(&data, &simulated, "q1", "Age", None).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid input: Variable 'q1' not found in the simulated data."
        );
    }
}
